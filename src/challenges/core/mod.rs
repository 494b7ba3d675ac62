//! Request plumbing shared by detection, solving and the browser session.

pub mod analysis;
pub mod executor;
pub mod reqwest_client;
pub mod types;

pub use analysis::{
    ChallengeParseError, IuamChallengeBlueprint, is_cloudflare_response, origin_from_url,
    parse_iuam_challenge,
};
pub use executor::{
    BufferedRequest, ChallengeExecutionError, ChallengeHttpClient, ChallengeHttpClientError,
    ChallengeHttpResponse, execute_challenge_submission,
};
pub use reqwest_client::ReqwestChallengeHttpClient;
pub use types::{ChallengeResponse, ChallengeSubmission};

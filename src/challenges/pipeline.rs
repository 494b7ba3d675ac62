//! Challenge orchestration pipeline.
//!
//! Runs the detector over a response and turns the detection into the next
//! action for the browser session: submit a form, wait and retry, or give up.

use thiserror::Error;

use crate::challenges::core::{ChallengeResponse, ChallengeSubmission};
use crate::challenges::detectors::{ChallengeDetection, ChallengeDetector, ChallengeType};
use crate::challenges::solvers::{
    MitigationPlan,
    javascript_v1::{JavascriptV1Error, JavascriptV1Solver},
    rate_limit::{RateLimitError, RateLimitHandler},
};

#[derive(Debug)]
pub enum ChallengePipelineResult {
    /// Not a challenge; hand the response to the caller.
    NoChallenge,
    /// Post this answer back to Cloudflare.
    Submission {
        detection: ChallengeDetection,
        submission: ChallengeSubmission,
    },
    /// Wait (or not) and retry the request.
    Mitigation {
        detection: ChallengeDetection,
        plan: MitigationPlan,
    },
    /// A challenge this client cannot pass.
    Unsupported { detection: ChallengeDetection },
    /// A solver was found but failed.
    Failed {
        detection: ChallengeDetection,
        error: PipelineError,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("javascript v1 solver error: {0}")]
    JavascriptV1(#[from] JavascriptV1Error),
    #[error("rate limit handler error: {0}")]
    RateLimit(#[from] RateLimitError),
}

pub struct ChallengePipeline {
    detector: ChallengeDetector,
    javascript_v1: Option<JavascriptV1Solver>,
    rate_limit: Option<RateLimitHandler>,
}

impl ChallengePipeline {
    /// A pipeline that detects challenges but solves none of them.
    pub fn new(detector: ChallengeDetector) -> Self {
        Self {
            detector,
            javascript_v1: None,
            rate_limit: None,
        }
    }

    pub fn with_javascript_v1(mut self, solver: JavascriptV1Solver) -> Self {
        self.javascript_v1 = Some(solver);
        self
    }

    pub fn with_rate_limit(mut self, handler: RateLimitHandler) -> Self {
        self.rate_limit = Some(handler);
        self
    }

    pub fn evaluate(&self, response: &ChallengeResponse<'_>) -> ChallengePipelineResult {
        let Some(detection) = self.detector.detect(response) else {
            return ChallengePipelineResult::NoChallenge;
        };

        match detection.challenge_type {
            ChallengeType::JavaScriptV1 => {
                let Some(solver) = self.javascript_v1.as_ref() else {
                    return ChallengePipelineResult::Unsupported { detection };
                };
                match solver.solve(response) {
                    Ok(submission) => ChallengePipelineResult::Submission {
                        detection,
                        submission,
                    },
                    Err(err) => ChallengePipelineResult::Failed {
                        detection,
                        error: err.into(),
                    },
                }
            }
            ChallengeType::RateLimit => {
                let Some(handler) = self.rate_limit.as_ref() else {
                    return ChallengePipelineResult::Unsupported { detection };
                };
                match handler.plan(response) {
                    Ok(plan) => ChallengePipelineResult::Mitigation { detection, plan },
                    Err(err) => ChallengePipelineResult::Failed {
                        detection,
                        error: err.into(),
                    },
                }
            }
            ChallengeType::JavaScriptV2
            | ChallengeType::ManagedV3
            | ChallengeType::Turnstile
            | ChallengeType::AccessDenied
            | ChallengeType::BotManagement => ChallengePipelineResult::Unsupported { detection },
        }
    }
}

impl Default for ChallengePipeline {
    fn default() -> Self {
        Self::new(ChallengeDetector::new())
    }
}

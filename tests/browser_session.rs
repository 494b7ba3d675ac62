use std::sync::Arc;
use std::time::{Duration, Instant};

use mockito::{Matcher, Server};
use webhook_bots::{
    BrowserSession, ChallengeType, GpLinksClient, ProviderEndpoints, ScraperError,
    ScraperSessionFactory,
};

fn session() -> BrowserSession {
    BrowserSession::builder()
        .with_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn redirects_are_returned_not_followed() {
    let mut server = Server::new_async().await;
    let landing = server
        .mock("GET", "/gplinks.co/xyz")
        .with_status(302)
        .with_header("location", "https://gplinks.in/track?pid=1&vid=abc")
        .expect(1)
        .create_async()
        .await;

    let response = session()
        .get(&format!("{}/gplinks.co/xyz", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 302);
    assert_eq!(
        response.location(),
        Some("https://gplinks.in/track?pid=1&vid=abc")
    );
    landing.assert_async().await;
}

#[tokio::test]
async fn cookies_persist_within_a_session() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/first")
        .with_status(200)
        .with_header("set-cookie", "sid=s3cr3t; Path=/")
        .with_body("ok")
        .create_async()
        .await;
    let second = server
        .mock("GET", "/second")
        .match_header("cookie", Matcher::Regex("sid=s3cr3t".into()))
        .with_status(200)
        .with_body("welcome back")
        .expect(1)
        .create_async()
        .await;

    let session = session();
    session.get(&format!("{}/first", server.url())).await.unwrap();
    let response = session
        .get(&format!("{}/second", server.url()))
        .await
        .unwrap();

    assert_eq!(response.text(), "welcome back");
    second.assert_async().await;
}

#[tokio::test]
async fn forms_are_url_encoded_with_extra_headers() {
    let mut server = Server::new_async().await;
    let go = server
        .mock("POST", "/links/go")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_header("x-requested-with", "XMLHttpRequest")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("_Token[fields]".into(), "a b&c".into()),
            Matcher::UrlEncoded("ad_form_data".into(), "blob".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"url":"https://destination.example/page"}"#)
        .expect(1)
        .create_async()
        .await;

    let response = session()
        .post_form(
            &format!("{}/links/go", server.url()),
            &[("_Token[fields]", "a b&c"), ("ad_form_data", "blob")],
            &[("x-requested-with", "XMLHttpRequest")],
        )
        .await
        .unwrap();

    let json: serde_json::Value = response.json().unwrap();
    assert_eq!(json["url"], "https://destination.example/page");
    go.assert_async().await;
}

#[tokio::test]
async fn long_rate_limit_is_not_waited_out() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/limited")
        .with_status(429)
        .with_header("server", "cloudflare")
        .with_header("retry-after", "600")
        .with_body(
            r#"<html><body><span class="cf-error-code">1015</span>
            <h1>You are being rate limited</h1></body></html>"#,
        )
        .create_async()
        .await;

    let err = session()
        .get(&format!("{}/limited", server.url()))
        .await
        .unwrap_err();

    match err {
        ScraperError::Mitigation(plan) => assert!(!plan.should_retry),
        other => panic!("expected a mitigation error, got {other:?}"),
    }
}

#[tokio::test]
async fn short_rate_limit_is_waited_out_and_retried() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("GET", "/busy")
        .match_header("cookie", Matcher::Missing)
        .with_status(429)
        .with_header("server", "cloudflare")
        .with_header("retry-after", "1")
        .with_header("set-cookie", "seen=1; Path=/")
        .with_body(
            r#"<html><body><span class="cf-error-code">1015</span>
            <h1>You are being rate limited</h1></body></html>"#,
        )
        .expect(1)
        .create_async()
        .await;
    let served = server
        .mock("GET", "/busy")
        .match_header("cookie", Matcher::Regex("seen=1".into()))
        .with_status(200)
        .with_body("served")
        .expect(1)
        .create_async()
        .await;

    let started = Instant::now();
    let response = session()
        .get(&format!("{}/busy", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "served");
    assert!(started.elapsed() >= Duration::from_secs(1));
    limited.assert_async().await;
    served.assert_async().await;
}

#[tokio::test]
async fn iuam_challenge_is_answered_and_request_replayed() {
    let mut server = Server::new_async().await;
    let base = server.url();

    let challenge = server
        .mock("GET", "/gplinks.co/abc")
        .match_header("cookie", Matcher::Missing)
        .with_status(503)
        .with_header("server", "cloudflare")
        .with_body(
            r#"<!DOCTYPE html>
<html>
<head><title>Just a moment...</title></head>
<body>
  <form id="challenge-form" action="/cdn-cgi/l/chk_jschl?__cf_chl_f_tk=tk1" method="POST">
    <input type="hidden" name="r" value="rv"/>
    <input type="hidden" name="jschl_vc" value="vc"/>
    <input type="hidden" name="pass" value="pw"/>
    <input type="hidden" id="jschl_answer" name="jschl_answer"/>
  </form>
  <script>
    setTimeout(function(){
      var f = document.getElementById('challenge-form');
      document.getElementById('jschl_answer').value = 10 + location.hostname.length;
      f.submit();
    }, 10);
  </script>
  <img src="/cdn-cgi/images/trace/jsch/js/transparent.gif"/>
</body>
</html>"#,
        )
        .expect(1)
        .create_async()
        .await;
    // The mock server listens on 127.0.0.1, so the script answers 10 + 9.
    let answer = server
        .mock("POST", Matcher::Regex(r"^/cdn-cgi/l/chk_jschl(\?.*)?$".into()))
        .match_query(Matcher::UrlEncoded("__cf_chl_f_tk".into(), "tk1".into()))
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("r".into(), "rv".into()),
            Matcher::UrlEncoded("jschl_vc".into(), "vc".into()),
            Matcher::UrlEncoded("pass".into(), "pw".into()),
            Matcher::UrlEncoded("jschl_answer".into(), "19.0000000000".into()),
        ]))
        .with_status(302)
        .with_header("set-cookie", "cf_clearance=ok; Path=/")
        .with_header("location", "/gplinks.co/abc")
        .expect(1)
        .create_async()
        .await;
    let replay = server
        .mock("GET", "/gplinks.co/abc")
        .match_header("cookie", Matcher::Regex("cf_clearance=ok".into()))
        .with_status(302)
        .with_header("location", &format!("{base}/track?vid=V1"))
        .expect(1)
        .create_async()
        .await;

    let response = session()
        .get(&format!("{base}/gplinks.co/abc"))
        .await
        .unwrap();

    assert_eq!(response.status(), 302);
    assert_eq!(response.location(), Some(format!("{base}/track?vid=V1").as_str()));
    challenge.assert_async().await;
    answer.assert_async().await;
    replay.assert_async().await;
}

#[tokio::test]
async fn turnstile_is_reported_as_unsupported() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/turnstile")
        .with_status(403)
        .with_header("server", "cloudflare")
        .with_body(
            r#"<html><body>
            <div class="cf-turnstile" data-sitekey="0x4AAA"></div>
            <script src="https://challenges.cloudflare.com/turnstile/v0/api.js"></script>
            </body></html>"#,
        )
        .create_async()
        .await;

    let err = session()
        .get(&format!("{}/turnstile", server.url()))
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::Unsupported(ChallengeType::Turnstile)));
}

#[tokio::test]
async fn non_cloudflare_errors_pass_through() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/down")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let response = session()
        .get(&format!("{}/down", server.url()))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    assert_eq!(response.text(), "maintenance");
}

#[tokio::test]
async fn full_bypass_against_local_provider() {
    let mut server = Server::new_async().await;
    let base = server.url();
    let link = format!("{base}/gplinks.co/xyz");

    let landing = server
        .mock("GET", "/gplinks.co/xyz")
        .with_status(302)
        .with_header("location", &format!("{base}/track?pid=1&vid=V9"))
        .expect(1)
        .create_async()
        .await;
    let impressions = server
        .mock("POST", "/track/data.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("request".into(), "addVisitorImps".into()),
            Matcher::UrlEncoded("vid".into(), "V9".into()),
        ]))
        .with_status(200)
        .with_body("{}")
        .expect(2)
        .create_async()
        .await;
    let visit = server
        .mock("POST", "/track/data.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("request".into(), "setVisitor".into()),
            Matcher::UrlEncoded("vid".into(), "V9".into()),
            Matcher::UrlEncoded("status".into(), "3".into()),
        ]))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let page = server
        .mock("GET", Matcher::Regex(r"^/gplinks\.co/xyz/(\?.*)?$".into()))
        .match_query(Matcher::UrlEncoded("vid".into(), "V9".into()))
        .with_status(200)
        .with_body(
            r#"<form id="go-link"><input name="_csrfToken" value="tok"><input name="ad_form_data" value="blob"></form>"#,
        )
        .expect(1)
        .create_async()
        .await;
    let go = server
        .mock("POST", "/links/go")
        .match_header("x-requested-with", "XMLHttpRequest")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("_csrfToken".into(), "tok".into()),
            Matcher::UrlEncoded("ad_form_data".into(), "blob".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"status":"success","url":"https://destination.example/page"}"#)
        .expect(1)
        .create_async()
        .await;

    let sessions = ScraperSessionFactory::new(Duration::from_secs(5));
    let client = GpLinksClient::new(Arc::new(sessions))
        .with_endpoints(ProviderEndpoints::new(base.clone(), base.clone()))
        .with_max_attempts(1);

    let destination = client.bypass(&link).await.unwrap();
    assert_eq!(destination, "https://destination.example/page");

    landing.assert_async().await;
    impressions.assert_async().await;
    visit.assert_async().await;
    page.assert_async().await;
    go.assert_async().await;
}

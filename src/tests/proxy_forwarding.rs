// This test simulates:
//  - an upstream that echoes back what it received (method, path, headers, body)
//  - the proxy in front of it, fed by a live token cache
// and checks path rewriting, the prefix header and token injection.

#[cfg(test)]
mod test {

    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::extract::Request;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use url::Url;

    use crate::cache::token_cache;
    use crate::proxy::forwarder::{build_upstream_client, ProxyState, Upstream};
    use crate::config::settings::UpstreamConfig;
    use crate::observability::metrics::get_metrics;
    use crate::server::server::{proxy_router, ServerTimeouts};
    use crate::tests::common::{build_reqwest_client, spawn_axum, token_expiring_in};

    async fn echo(req: Request) -> Json<Value> {
        let (parts, body) = req.into_parts();
        let body = to_bytes(body, usize::MAX).await.unwrap();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Json(json!({
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "query": parts.uri.query(),
            "authorization": header("authorization"),
            "prefix": header("x-forwarded-prefix"),
            "forwarded_for": header("x-forwarded-for"),
            "host": header("host"),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    fn upstream_config(url: &str) -> UpstreamConfig {
        UpstreamConfig {
            url: Url::parse(url).unwrap(),
            ca_file: None,
            read_timeout: None,
            write_timeout: None,
        }
    }

    #[tokio::test]
    async fn forwards_to_base_path_with_prefix_and_bearer() {
        let (upstream_h, upstream_addr) = spawn_axum(Router::new().fallback(echo)).await;

        let cfg = upstream_config(&format!("http://{}/api/metrics/v1/test", upstream_addr));
        let (writer, tokens) = token_cache::channel();
        writer.set(token_expiring_in("live-token", 600));

        let state = ProxyState::new(
            Upstream::from_url(&cfg.url).unwrap(),
            build_upstream_client(&cfg).unwrap(),
            tokens,
        );
        let (proxy_h, proxy_addr) = spawn_axum(proxy_router(state, ServerTimeouts::default())).await;

        let client = build_reqwest_client();
        let resp = client
            .get(format!("http://{}/foo/bar?query=up", proxy_addr))
            .header("authorization", "Bearer client-supplied")
            .send()
            .await
            .expect("proxy request");
        assert!(resp.status().is_success());
        let seen: Value = resp.json().await.unwrap();

        assert_eq!(seen["method"], "GET");
        assert_eq!(seen["path"], "/api/metrics/v1/test/foo/bar");
        assert_eq!(seen["query"], "query=up");
        assert_eq!(seen["prefix"], "/");
        assert_eq!(seen["authorization"], "Bearer live-token");
        assert_eq!(seen["forwarded_for"], "127.0.0.1");
        assert_eq!(seen["host"], upstream_addr.to_string());

        // a refresh is visible to the very next request
        writer.set(token_expiring_in("rotated-token", 600));
        let seen: Value = client
            .post(format!("http://{}/receive", proxy_addr))
            .body("sample payload")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(seen["method"], "POST");
        assert_eq!(seen["path"], "/api/metrics/v1/test/receive");
        assert_eq!(seen["authorization"], "Bearer rotated-token");
        assert_eq!(seen["body"], "sample payload");

        upstream_h.abort();
        proxy_h.abort();
    }

    #[tokio::test]
    async fn forwards_without_token_before_first_fetch() {
        let (upstream_h, upstream_addr) = spawn_axum(Router::new().fallback(echo)).await;

        let cfg = upstream_config(&format!("http://{}/", upstream_addr));
        let (_writer, tokens) = token_cache::channel();
        let state = ProxyState::new(
            Upstream::from_url(&cfg.url).unwrap(),
            build_upstream_client(&cfg).unwrap(),
            tokens,
        );
        let (proxy_h, proxy_addr) = spawn_axum(proxy_router(state, ServerTimeouts::default())).await;

        let seen: Value = build_reqwest_client()
            .get(format!("http://{}/api/v1/query", proxy_addr))
            .header("authorization", "Bearer client-supplied")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(seen["path"], "/api/v1/query");
        assert_eq!(seen["prefix"], "/");
        assert!(seen["authorization"].is_null(), "no token must be attached");

        upstream_h.abort();
        proxy_h.abort();
    }

    #[tokio::test]
    async fn unreachable_upstream_answers_bad_gateway() {
        // grab a free port and release it so nothing listens there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_addr = listener.local_addr().unwrap();
        drop(listener);

        let cfg = upstream_config(&format!("http://{}", dead_addr));
        let (writer, tokens) = token_cache::channel();
        writer.set(token_expiring_in("live-token", 600));
        let state = ProxyState::new(
            Upstream::from_url(&cfg.url).unwrap(),
            build_upstream_client(&cfg).unwrap(),
            tokens,
        );
        let timeouts = ServerTimeouts {
            read: Some(Duration::from_secs(2)),
            write: Some(Duration::from_secs(2)),
        };
        let (proxy_h, proxy_addr) = spawn_axum(proxy_router(state, timeouts)).await;

        let resp = build_reqwest_client()
            .get(format!("http://{}/anything", proxy_addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);

        proxy_h.abort();
    }

    #[tokio::test]
    async fn upstream_redirects_are_passed_through() {
        let redirecting = Router::new().fallback(|| async {
            (reqwest::StatusCode::FOUND, [("location", "/elsewhere")], "")
        });
        let (upstream_h, upstream_addr) = spawn_axum(redirecting).await;

        let cfg = upstream_config(&format!("http://{}", upstream_addr));
        let (_writer, tokens) = token_cache::channel();
        let state = ProxyState::new(
            Upstream::from_url(&cfg.url).unwrap(),
            build_upstream_client(&cfg).unwrap(),
            tokens,
        );
        let (proxy_h, proxy_addr) = spawn_axum(proxy_router(state, ServerTimeouts::default())).await;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let resp = client.get(format!("http://{}/start", proxy_addr)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::FOUND);
        assert_eq!(resp.headers()["location"], "/elsewhere");

        upstream_h.abort();
        proxy_h.abort();
    }

    #[tokio::test]
    async fn write_timeout_answers_408_and_is_counted() {
        let slow = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            "too late"
        });
        let (upstream_h, upstream_addr) = spawn_axum(slow).await;

        let cfg = upstream_config(&format!("http://{}", upstream_addr));
        let (_writer, tokens) = token_cache::channel();
        let state = ProxyState::new(
            Upstream::from_url(&cfg.url).unwrap(),
            build_upstream_client(&cfg).unwrap(),
            tokens,
        );
        let timeouts = ServerTimeouts {
            read: None,
            write: Some(Duration::from_millis(200)),
        };
        let (proxy_h, proxy_addr) = spawn_axum(proxy_router(state, timeouts)).await;

        let timed_out = get_metrics()
            .await
            .http_requests
            .with_label_values(&["408", "PATCH", "proxy"]);
        let before = timed_out.get();

        let resp = build_reqwest_client()
            .patch(format!("http://{}/slow", proxy_addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::REQUEST_TIMEOUT);
        assert_eq!(timed_out.get(), before + 1);

        upstream_h.abort();
        proxy_h.abort();
    }
}

//! End-to-end tests against live local servers.

use crate::client::{require_success, RetryOptions};
use crate::{
    ContentType, Method, RequestBuilder, RequestContext, RestError,
    StreamResponse,
};
use mockito::Matcher;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Default, Deserialize)]
struct Reply {
    code: i32,
    message: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Answers every bodiless request on a kept-alive connection; counts accepts
async fn keep_alive_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    pending.extend_from_slice(&chunk[..n]);
                    while let Some(end) = header_end(&pending) {
                        pending.drain(..end);
                        let reply = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
                        if socket.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    (format!("http://{}", addr), accepted)
}

/// Accepts connections and never answers
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _socket = socket;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    format!("http://{}", addr)
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

#[tokio::test]
async fn test_get_with_path_variable_and_query() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/user/detail/2")
        .match_query(Matcher::UrlEncoded("verbose".into(), "1".into()))
        .match_header("token", "234")
        .with_status(200)
        .with_body(r#"{"code":0,"message":"Rose"}"#)
        .create_async()
        .await;

    let mut reply = Reply::default();
    let response = RequestBuilder::new()
        .base_url(server.url())
        .path_variables([("id", "2")])
        .query([("verbose", "1")])
        .header("token", "234")
        .deserialize_response_into(&mut reply)
        .send(Method::GET, "/user/detail/:id")
        .await;

    let response = assert_ok!(response);
    assert_eq!(response.status_text(), "200 OK");
    assert_eq!(response.proto(), "HTTP/1.1");
    assert_eq!(reply.code, 0);
    assert_eq!(reply.message, "Rose");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_json_payload() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/user/register")
        .match_header("content-type", "application/json")
        .match_header("x-tt-env", "boe_feat")
        .match_body(Matcher::Json(serde_json::json!({"user_id": 5, "username": "Rose"})))
        .with_status(200)
        .with_body(r#"{"code":0,"message":"registered"}"#)
        .create_async()
        .await;

    let env = Some("boe_feat");
    let response = RequestBuilder::new()
        .content_type(ContentType::Json)
        .headers([("token", "234")])
        .conditional_header(|| ("x-tt-env", env.unwrap_or_default()))
        .payload(&serde_json::json!({"user_id": 5, "username": "Rose"}))
        .send("post", &format!("{}/user/register", server.url()))
        .await
        .unwrap();

    let reply: Reply = response.json().unwrap();
    assert_eq!(reply.message, "registered");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_form_urlencoded_payload_and_curl() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/user/register")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body("id=5&username=Rose")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let url = format!("{}/user/register", server.url());
    let seen = Arc::new(Mutex::new(None::<String>));
    let sink = seen.clone();
    RequestBuilder::new()
        .content_type(ContentType::FormUrlEncoded)
        .form([("id", "5"), ("username", "Rose")])
        .on_curl_generated(move |curl| *sink.lock().unwrap() = Some(curl.to_string()))
        .send(Method::POST, &url)
        .await
        .unwrap();

    let curl = seen.lock().unwrap().clone().unwrap();
    assert_eq!(
        curl,
        format!(
            "curl --location --request POST '{}' \\\n\
             --header 'Content-Type: application/x-www-form-urlencoded' \\\n\
             --data-urlencode 'id=5' \\\n\
             --data-urlencode 'username=Rose' \\\n",
            url
        )
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_multipart_upload_from_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=.+$".into()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("name=\"user\"".into()),
            Matcher::Regex("erik".into()),
            Matcher::Regex("filename=\"formfile-".into()),
            Matcher::Regex("cover contents".into()),
        ]))
        .with_status(200)
        .with_body("{}")
        .expect(2)
        .create_async()
        .await;

    let path = std::env::temp_dir().join(format!("formfile-{}.txt", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, b"cover contents").await.unwrap();

    let mut builder = RequestBuilder::new()
        .form([("user", "erik")])
        .file("cover", path.to_string_lossy());
    let url = format!("{}/upload", server.url());
    assert_ok!(builder.send(Method::POST, &url).await);
    assert_ok!(builder.send(Method::POST, &url).await);

    tokio::fs::remove_file(&path).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_multipart_upload_from_reader() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/avatar")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("filename=\"erik-test.png\"".into()),
            Matcher::Regex("avatar-bytes".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;

    let response = RequestBuilder::new()
        .file_from_reader(
            "avatar",
            "testdata/erik-test.png",
            tokio_test::io::Builder::new()
                .read(b"avatar-")
                .read(b"bytes")
                .build(),
        )
        .send(Method::PUT, &format!("{}/avatar", server.url()))
        .await;
    assert_ok!(response);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_multipart_upload_from_remote_url() {
    let mut server = mockito::Server::new_async().await;
    let download = server
        .mock("GET", "/cover")
        .with_status(200)
        .with_body(b"\x89PNG\r\n\x1a\nimage")
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/upload")
        .match_body(Matcher::Regex("filename=\"resource_[0-9a-f_]+\\.png\"".into()))
        .with_status(200)
        .create_async()
        .await;

    RequestBuilder::new()
        .file("cover", format!("{}/cover", server.url()))
        .send(Method::POST, &format!("{}/upload", server.url()))
        .await
        .unwrap();

    download.assert_async().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn test_failed_download_is_file_access() {
    let mut server = mockito::Server::new_async().await;
    let _missing = server
        .mock("GET", "/cover")
        .with_status(404)
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/upload")
        .expect(0)
        .create_async()
        .await;

    let err = RequestBuilder::new()
        .file("cover", format!("{}/cover", server.url()))
        .send(Method::POST, &format!("{}/upload", server.url()))
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::FileAccess { .. }));
    upload.assert_async().await;
}

#[tokio::test]
async fn test_octet_stream_payload() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/blob")
        .match_header("content-type", "binary/octet-stream")
        .match_body("raw-bytes")
        .with_status(201)
        .create_async()
        .await;

    let response = RequestBuilder::new()
        .content_type(ContentType::OctetStream)
        .bytes(&b"raw-bytes"[..])
        .send(Method::POST, &format!("{}/blob", server.url()))
        .await
        .unwrap();
    assert_eq!(response.status_code(), 201);
    assert!(response.is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_path_variable_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let result = RequestBuilder::new()
        .base_url(server.url())
        .send(Method::GET, "/user/detail/:id")
        .await;
    let err = assert_err!(result);
    assert_eq!(err.to_string(), "path variable [id] not set");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_with_retry_exhausts_attempts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/retry/test")
        .with_status(504)
        .with_body(r#"{"code":-1}"#)
        .expect(3)
        .create_async()
        .await;

    let retries = Arc::new(AtomicUsize::new(0));
    let counter = retries.clone();
    let err = RequestBuilder::new()
        .send_with_retry(
            Method::GET,
            &format!("{}/retry/test", server.url()),
            require_success,
            RetryOptions::new()
                .attempts(3)
                .delay(Duration::from_millis(1))
                .on_retry(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap_err();

    match err {
        RestError::RetriesExhausted { attempts, errors } => {
            assert_eq!(attempts, 3);
            assert_eq!(errors.len(), 3);
            assert_eq!(errors[0].to_string(), "http status code: 504");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_events_in_order() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat")
        .match_header("accept", "text/event-stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: first\n\n: keep-alive\n\nevent: ping\ndata: second\n\ndata: [DONE]\n\ndata: never\n\n")
        .create_async()
        .await;

    let mut events = Vec::new();
    let mut statuses = Vec::new();
    RequestBuilder::new()
        .payload(&serde_json::json!({"prompt": "hi"}))
        .send_stream(
            &RequestContext::background(),
            Method::POST,
            &format!("{}/chat", server.url()),
            |meta: &StreamResponse, data: &str| {
                statuses.push(meta.status_code());
                events.push(data.to_string());
                Ok(())
            },
        )
        .await
        .unwrap();

    assert_eq!(events, vec!["first", "second"]);
    assert_eq!(statuses, vec![200, 200]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_drops_unterminated_final_line() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/events")
        .with_status(200)
        .with_body("data: one\ndata: tw")
        .create_async()
        .await;

    let mut events = Vec::new();
    RequestBuilder::new()
        .send_stream(
            &RequestContext::background(),
            Method::GET,
            &format!("{}/events", server.url()),
            |_: &StreamResponse, data: &str| {
                events.push(data.to_string());
                Ok(())
            },
        )
        .await
        .unwrap();
    assert_eq!(events, vec!["one"]);
}

#[tokio::test]
async fn test_stream_handler_error_stops_reading() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/events")
        .with_status(200)
        .with_body("data: one\ndata: two\ndata: three\n")
        .create_async()
        .await;

    let mut calls = 0;
    let err = RequestBuilder::new()
        .send_stream(
            &RequestContext::background(),
            Method::GET,
            &format!("{}/events", server.url()),
            |_: &StreamResponse, _: &str| {
                calls += 1;
                Err(RestError::handler("stop"))
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "stop");
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn test_stream_non_ok_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/events")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let mut calls = 0;
    let err = RequestBuilder::new()
        .send_stream(
            &RequestContext::background(),
            Method::GET,
            &format!("{}/events", server.url()),
            |_: &StreamResponse, _: &str| {
                calls += 1;
                Ok(())
            },
        )
        .await
        .unwrap_err();

    assert_eq!(calls, 0);
    match err {
        RestError::NonOkStatus { status, body } => {
            assert_eq!(status, "500 Internal Server Error");
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_subscribe_yields_events() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/events")
        .with_status(200)
        .with_body("data: a\n\ndata: b\n\ndata: [DONE]\n\n")
        .create_async()
        .await;

    let mut stream = RequestBuilder::new()
        .subscribe(
            RequestContext::background(),
            Method::GET,
            &format!("{}/events", server.url()),
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    assert_eq!(events, vec!["a", "b"]);
}

#[tokio::test]
async fn test_connection_reused_across_sends() {
    let (url, accepted) = keep_alive_server().await;

    for _ in 0..2 {
        let response = RequestBuilder::new()
            .send(Method::GET, &format!("{}/ping", url))
            .await
            .unwrap();
        assert_eq!(response.body_as_string(), "ok");
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_interrupts_send() {
    let url = silent_server().await;
    let (ctx, handle) = RequestContext::with_cancel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let err = RequestBuilder::new()
        .send_with_context(&ctx, Method::GET, &format!("{}/slow", url))
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::Cancelled));
    assert!(err.is_network());
}

#[tokio::test]
async fn test_deadline_interrupts_stream() {
    let url = silent_server().await;
    let ctx = RequestContext::with_timeout(Duration::from_millis(50));

    let err = RequestBuilder::new()
        .send_stream(&ctx, Method::GET, &format!("{}/events", url), |_: &StreamResponse, _: &str| Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::Timeout));
}

#[tokio::test]
async fn test_cancelled_context_skips_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/retry/test")
        .expect(0)
        .create_async()
        .await;

    let (ctx, handle) = RequestContext::with_cancel();
    handle.cancel();
    let err = RequestBuilder::new()
        .send_with_context_and_retry(
            &ctx,
            Method::GET,
            &format!("{}/retry/test", server.url()),
            require_success,
            RetryOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::Cancelled));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cancel_during_retry_delay() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/retry/test")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let (ctx, handle) = RequestContext::with_cancel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let started = std::time::Instant::now();
    let err = RequestBuilder::new()
        .on_curl_generated(crate::log_curl)
        .send_with_context_and_retry(
            &ctx,
            Method::GET,
            &format!("{}/retry/test", server.url()),
            require_success,
            RetryOptions::new()
                .attempts(3)
                .delay(Duration::from_secs(3))
                .delay_type(crate::client::DelayType::Fixed),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_write_response_to_file() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/download")
        .with_status(200)
        .with_body("file body")
        .create_async()
        .await;

    let response = RequestBuilder::new()
        .send(Method::GET, &format!("{}/download", server.url()))
        .await
        .unwrap();
    let dir = std::env::temp_dir().join(format!("rest-chain-test-{}", uuid::Uuid::new_v4()));
    let target = dir.join("nested").join("out.txt");
    assert_ok!(response.write_to_file(&target).await);
    assert_eq!(tokio::fs::read_to_string(&target).await.unwrap(), "file body");
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

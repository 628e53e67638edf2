//! Status-code boundaries and bulk cancellation, through every completion
//! style, using the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::oneshot;
use wirecall_core::{
    ApiClient, Endpoint, ErrorKind, MockTransport, NetError, RequestHandle, TransportError,
};

fn endpoint() -> Endpoint {
    Endpoint::get("https://api.example.com/resource").build()
}

/// Run the same request through callback, async and stream front ends.
async fn all_styles(client: &ApiClient) -> [Result<Bytes, NetError>; 3] {
    let endpoint = endpoint();

    let (tx, rx) = oneshot::channel();
    client.request_data(&endpoint, move |result| {
        let _ = tx.send(result);
    });
    let callback = rx.await.unwrap();
    let suspended = client.fetch_data(&endpoint).await;
    let streamed = client.stream_data(&endpoint).next().await.unwrap();

    [callback, suspended, streamed]
}

fn summary(result: &Result<Bytes, NetError>) -> Result<Vec<u8>, (ErrorKind, i32, Option<u16>)> {
    match result {
        Ok(body) => Ok(body.to_vec()),
        Err(e) => Err((e.kind(), e.code(), e.status())),
    }
}

#[tokio::test]
async fn status_boundaries_classify_identically_across_styles() {
    let cases: &[(u16, Option<ErrorKind>)] = &[
        (199, Some(ErrorKind::RequestFailed)),
        (200, None),
        (204, None),
        (299, None),
        (300, Some(ErrorKind::RequestFailed)),
        (400, Some(ErrorKind::BadRequest)),
        (401, Some(ErrorKind::Unauthorized)),
        (403, Some(ErrorKind::Prohibited)),
        (404, Some(ErrorKind::NotFound)),
        (408, Some(ErrorKind::Timeout)),
        (422, Some(ErrorKind::DecodingFailed)),
        (499, Some(ErrorKind::RequestFailed)),
        (500, Some(ErrorKind::ServerError)),
        (599, Some(ErrorKind::ServerError)),
        (600, Some(ErrorKind::RequestFailed)),
    ];

    for &(status, expected) in cases {
        let client = ApiClient::new(MockTransport::respond(status, "payload"));
        let results = all_styles(&client).await;

        let first = summary(&results[0]);
        for other in &results[1..] {
            assert_eq!(summary(other), first, "styles disagree for {status}");
        }

        match expected {
            None => assert_eq!(first, Ok(b"payload".to_vec()), "status {status}"),
            Some(kind) => {
                let (got, _, _) = first.unwrap_err();
                assert_eq!(got, kind, "status {status}");
            }
        }
    }
}

#[tokio::test]
async fn error_codes_follow_the_stable_table() {
    for (status, code) in [
        (400, 400),
        (401, 401),
        (403, 403),
        (404, 404),
        (422, 422),
        (408, 408),
        (503, 500),
        (418, 1000),
    ] {
        let client = ApiClient::new(MockTransport::respond(status, ""));
        let err = client.fetch_data(&endpoint()).await.unwrap_err();
        assert_eq!(err.code(), code, "status {status}");
    }
}

#[tokio::test]
async fn transport_failures_classify_identically_across_styles() {
    for (error, kind) in [
        (TransportError::Connect("refused".into()), ErrorKind::RequestFailed),
        (TransportError::Other("dns".into()), ErrorKind::RequestFailed),
        (TransportError::TimedOut("slow".into()), ErrorKind::Timeout),
        (TransportError::Cancelled, ErrorKind::Cancelled),
    ] {
        let client = ApiClient::new(MockTransport::fail(error));
        for result in all_styles(&client).await {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status(), None);
        }
    }
}

#[tokio::test]
async fn dropping_a_stream_cancels_its_request() {
    let client = ApiClient::new(
        MockTransport::respond(200, "late").with_delay(Duration::from_secs(30)),
    );
    let mut stream = client.stream_data(&endpoint());
    let polled = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
    assert!(polled.is_err());
    drop(stream);

    let handles = client.registry().handles();
    assert_eq!(handles.len(), 1);
    assert!(handles[0].is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_all_races_with_concurrent_dispatch() {
    let client = ApiClient::new(
        MockTransport::respond(200, "{}").with_delay(Duration::from_secs(30)),
    );

    let before: Vec<Arc<RequestHandle>> = (0..50)
        .map(|_| client.request_data(&endpoint(), |_| {}))
        .collect();

    let racers: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                (0..25)
                    .map(|_| client.request_data(&endpoint(), |_| {}))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    client.cancel_all();
    assert!(before.iter().all(|h| !h.is_alive()));

    let mut raced = Vec::new();
    for racer in racers {
        raced.extend(racer.await.unwrap());
    }
    let survivors = raced.iter().filter(|h| h.is_alive()).count();
    assert_eq!(client.in_flight(), survivors);

    client.cancel_all();
    assert_eq!(client.in_flight(), 0);
    assert!(raced.iter().all(|h| !h.is_alive()));
}

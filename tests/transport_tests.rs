//! Native transport against a local tokio-tungstenite server.

#[cfg(all(test, feature = "headless"))]
mod tests {
    use argos_webviz::{
        protocol::endpoint_url,
        transport, Command, ReconnectPolicy, SceneRecorder, SceneSession, TransportEvent,
    };
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::Message};

    const BROADCAST: &str = r#"{"type":"broadcast","state":"EXPERIMENT_PAUSED","steps":3,
        "arena":{"size":{"x":1.0,"y":1.0,"z":1.0}},
        "entities":[{"id":1,"type":"foot-bot","position":{"x":0,"y":0,"z":0},
                     "orientation":{"x":0,"y":0,"z":0,"w":1}}]}"#;

    #[test]
    fn round_trip_through_local_server() {
        tokio_test::block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();

            // Server: push one broadcast, then report the first command received.
            let server = tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                ws.send(Message::Text(BROADCAST.to_string())).await.unwrap();
                loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => return text,
                        Some(Ok(_)) => continue,
                        other => panic!("server read failed: {other:?}"),
                    }
                }
            });

            let mut link = transport::spawn(
                endpoint_url("127.0.0.1", port, false),
                ReconnectPolicy::never(),
            );
            let mut session = SceneSession::new(SceneRecorder::new());

            assert_eq!(link.recv().await, Some(TransportEvent::Opened));
            session.handle_transport(TransportEvent::Opened);

            let event = link.recv().await.unwrap();
            assert!(matches!(event, TransportEvent::Message(_)));
            session.handle_transport(event);
            session.frame();
            assert_eq!(session.registry().len(), 1);

            session.send(Command::Play).unwrap();
            for command in session.drain_outbox() {
                link.send(command);
            }

            let received = server.await.unwrap();
            assert_eq!(received, r#"{"command":"play"}"#);

            link.shutdown().await;
        });
    }

    #[test]
    fn failed_connect_reports_close_and_gives_up() {
        tokio_test::block_on(async {
            // Bind then drop to get a port nobody listens on.
            let port = {
                let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
                l.local_addr().unwrap().port()
            };

            let mut link = transport::spawn(
                endpoint_url("127.0.0.1", port, false),
                ReconnectPolicy::never(),
            );
            assert!(matches!(
                link.recv().await,
                Some(TransportEvent::Closed { .. })
            ));
            assert_eq!(link.recv().await, None);
        });
    }
}

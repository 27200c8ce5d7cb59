//! Session channel tests: connection, playback, logs, commands.

#[cfg(test)]
mod tests {
    use argos_webviz::{
        session::{SessionChannel, SnapshotArrival},
        Command, CommandError, ConnectionStatus, PlaybackState, SessionNotice, TransportEvent,
    };
    use serde_json::json;

    fn broadcast(state: &str, steps: u64) -> TransportEvent {
        TransportEvent::Message(
            json!({
                "type": "broadcast",
                "state": state,
                "steps": steps,
                "arena": {"size": {"x": 1.0, "y": 1.0, "z": 1.0}},
                "entities": []
            })
            .to_string(),
        )
    }

    fn logs(lines: &[(&str, u64, &str)]) -> TransportEvent {
        let messages: Vec<_> = lines
            .iter()
            .map(|(kind, step, msg)| json!({"log_type": kind, "step": step, "log_message": msg}))
            .collect();
        TransportEvent::Message(json!({"type": "log", "messages": messages}).to_string())
    }

    fn connected() -> SessionChannel {
        let mut c = SessionChannel::new(100);
        c.handle_event(TransportEvent::Opened);
        c.drain_notices();
        c
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    #[test]
    fn open_and_close_are_tracked() {
        let mut c = SessionChannel::new(10);
        assert_eq!(c.state().connection, ConnectionStatus::Disconnected);

        c.handle_event(TransportEvent::Opened);
        assert!(c.state().is_connected());

        c.handle_event(TransportEvent::Closed {
            reason: "server went away".into(),
        });
        assert!(!c.state().is_connected());
        assert_eq!(
            c.drain_notices(),
            vec![
                SessionNotice::Connected,
                SessionNotice::Disconnected {
                    reason: "server went away".into()
                }
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Broadcasts
    // -----------------------------------------------------------------------

    #[test]
    fn first_broadcast_is_reported_once() {
        let mut c = connected();
        assert_eq!(
            c.handle_event(broadcast("EXPERIMENT_INITIALIZED", 0)),
            Some(SnapshotArrival::First)
        );
        assert_eq!(
            c.handle_event(broadcast("EXPERIMENT_PLAYING", 1)),
            Some(SnapshotArrival::Later)
        );
        assert_eq!(c.state().steps, 1);
        assert_eq!(c.state().status_label(), "Playing");
        assert_eq!(c.broadcasts(), 2);
    }

    #[test]
    fn playback_changes_are_noticed_once() {
        let mut c = connected();
        c.handle_event(broadcast("EXPERIMENT_PLAYING", 1));
        c.handle_event(broadcast("EXPERIMENT_PLAYING", 2));
        c.handle_event(broadcast("EXPERIMENT_FAST_FORWARDING", 3));

        let changes: Vec<_> = c
            .drain_notices()
            .into_iter()
            .filter_map(|n| match n {
                SessionNotice::PlaybackChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![PlaybackState::Playing, PlaybackState::FastForwarding]
        );
        assert_eq!(c.state().status_label(), "Fast Forwarding");
    }

    #[test]
    fn unknown_state_string_is_unknown() {
        let mut c = connected();
        c.handle_event(broadcast("EXPERIMENT_EXPLODED", 1));
        assert_eq!(c.state().playback, Some(PlaybackState::Unknown));
        assert_eq!(c.state().status_label(), "Unknown");
    }

    // -----------------------------------------------------------------------
    // Logs
    // -----------------------------------------------------------------------

    #[test]
    fn logs_split_into_panes_newest_first() {
        let mut c = connected();
        c.handle_event(logs(&[("LOG", 1, "a"), ("LOGERR", 1, "oops"), ("LOG", 2, "b")]));

        let log: Vec<_> = c.state().console.log().map(|l| l.log_message.clone()).collect();
        assert_eq!(log, vec!["b", "a"]);
        assert_eq!(c.state().console.error_len(), 1);
    }

    #[test]
    fn reset_clears_log_panes() {
        let mut c = connected();
        c.handle_event(broadcast("EXPERIMENT_PLAYING", 5));
        c.handle_event(logs(&[("LOG", 5, "running"), ("LOGERR", 5, "warn")]));
        c.handle_event(broadcast("EXPERIMENT_DONE", 6));
        assert_eq!(c.state().console.log_len(), 1);

        c.drain_notices();
        c.handle_event(broadcast("EXPERIMENT_INITIALIZED", 0));
        assert_eq!(c.state().console.log_len(), 0);
        assert_eq!(c.state().console.error_len(), 0);
        assert!(c.drain_notices().contains(&SessionNotice::ExperimentReset));
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    #[test]
    fn fast_forward_over_limit_is_never_transmitted() {
        let mut c = connected();
        c.send(Command::FastForward { steps: Some(501) }).unwrap();
        c.send(Command::fast_forward(Some(0))).unwrap();
        c.send(Command::fast_forward(Some(500))).unwrap();

        let wire: Vec<String> = c
            .drain_outbox()
            .iter()
            .map(|cmd| cmd.encode().unwrap())
            .collect();
        assert_eq!(wire[0], r#"{"command":"fastforward"}"#);
        assert_eq!(wire[1], r#"{"command":"fastforward"}"#);
        assert_eq!(wire[2], r#"{"command":"fastforward","steps":500}"#);
        assert!(wire.iter().all(|w| !w.contains("501")));
    }

    #[test]
    fn done_only_allows_reset() {
        let mut c = connected();
        c.handle_event(broadcast("EXPERIMENT_DONE", 100));

        assert_eq!(
            c.send(Command::Play),
            Err(CommandError::Disabled {
                command: "play",
                state: "Done"
            })
        );
        assert!(c.send(Command::Step).is_err());
        assert!(c.send(Command::Reset).is_ok());
        assert_eq!(c.drain_outbox(), vec![Command::Reset]);
    }

    #[test]
    fn commands_refused_while_disconnected() {
        let mut c = SessionChannel::new(10);
        assert_eq!(c.send(Command::Step), Err(CommandError::NotConnected));
        assert!(!c.has_outgoing());
    }

    #[test]
    fn commands_parse_from_cli_syntax() {
        let mut c = connected();
        for text in ["play", "pause", "step", "fastforward:20", "reset"] {
            c.send(text.parse().unwrap()).unwrap();
        }
        let names: Vec<_> = c.drain_outbox().iter().map(Command::name).collect();
        assert_eq!(names, vec!["play", "pause", "step", "fastforward", "reset"]);
    }
}

//! Registry and reconciliation tests, driven through `SceneSession`.

#[cfg(test)]
mod tests {
    use argos_webviz::{
        reconcile::LoopState, AssetOutcome, EntityId, FrameOutcome, Rebuild, SceneRecorder,
        SceneSession, Shape, TransportEvent, Vec3, VisualHandle,
    };
    use serde_json::{json, Value};
    use std::collections::BTreeSet;

    /// Arena 2 wide → scale 8.
    const SCALE: f32 = 8.0;

    fn broadcast(entities: Vec<Value>) -> TransportEvent {
        TransportEvent::Message(
            json!({
                "type": "broadcast",
                "state": "EXPERIMENT_PLAYING",
                "steps": 10,
                "arena": {"size": {"x": 2.0, "y": 2.0, "z": 1.0}},
                "entities": entities,
            })
            .to_string(),
        )
    }

    fn footbot(id: i64, x: f32, y: f32) -> Value {
        json!({
            "id": id,
            "type": "foot-bot",
            "position": {"x": x, "y": y, "z": 0.0},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0},
            "leds": "#ff0000;#00ff00",
            "points": [],
            "rays": []
        })
    }

    fn khepera(id: i64) -> Value {
        json!({
            "id": id,
            "type": "kheperaiv",
            "position": {"x": 0.1, "y": 0.1, "z": 0.0},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}
        })
    }

    fn light(id: i64) -> Value {
        json!({
            "id": id,
            "type": "light",
            "position": {"x": 0.0, "y": 0.0, "z": 0.5},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0},
            "color": "0xffffff"
        })
    }

    fn session() -> SceneSession<SceneRecorder> {
        let mut s = SceneSession::new(SceneRecorder::new());
        s.handle_transport(TransportEvent::Opened);
        s
    }

    fn ids(s: &SceneSession<SceneRecorder>) -> BTreeSet<EntityId> {
        s.registry().proxies().map(|p| p.id.clone()).collect()
    }

    fn visuals(s: &SceneSession<SceneRecorder>) -> Vec<VisualHandle> {
        s.registry().proxies().filter_map(|p| p.visual).collect()
    }

    // -----------------------------------------------------------------------
    // Update path
    // -----------------------------------------------------------------------

    #[test]
    fn same_ids_update_in_place() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0), footbot(2, 0.5, 0.5)]));
        assert_eq!(s.frame(), FrameOutcome::Rebuilt(Rebuild::Complete));
        let before = visuals(&s);

        s.handle_transport(broadcast(vec![footbot(1, 0.25, 0.0), footbot(2, 0.5, 0.75)]));
        let FrameOutcome::Updated(report) = s.frame() else {
            panic!("same id set must take the update path");
        };
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, 0);

        let mut after = visuals(&s);
        let mut before_sorted = before.clone();
        after.sort();
        before_sorted.sort();
        assert_eq!(after, before_sorted, "update must not replace visuals");

        let expected: BTreeSet<EntityId> = [EntityId::Index(1), EntityId::Index(2)].into();
        assert_eq!(ids(&s), expected);

        let p1 = s.registry().get(&EntityId::Index(1)).unwrap();
        assert_eq!(p1.transform.position, Vec3::new(0.25 * SCALE, 0.0, 0.0));
        let recorded = s.backend().visual(p1.visual.unwrap()).unwrap();
        assert_eq!(recorded.transform, p1.transform);
    }

    #[test]
    fn update_sets_full_position() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0)]));
        s.frame();

        let mut lifted = footbot(1, 0.1, 0.2);
        lifted["position"]["z"] = json!(0.5);
        s.handle_transport(broadcast(vec![lifted]));
        s.frame();

        let p = s.registry().get(&EntityId::Index(1)).unwrap();
        assert_eq!(p.transform.position, Vec3::new(0.1 * SCALE, 0.2 * SCALE, 0.5 * SCALE));
    }

    // -----------------------------------------------------------------------
    // Rebuild trigger
    // -----------------------------------------------------------------------

    #[test]
    fn count_change_triggers_rebuild() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0)]));
        s.frame();
        assert_eq!(s.registry().len(), 1);

        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0), footbot(2, 0.1, 0.1)]));
        assert_eq!(s.frame(), FrameOutcome::Rebuilt(Rebuild::Complete));
        assert_eq!(s.registry().len(), 2);
        assert_eq!(s.registry().generation(), 2);
    }

    #[test]
    fn same_count_different_ids_triggers_rebuild() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0), footbot(2, 0.1, 0.1)]));
        s.frame();

        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0), footbot(3, 0.1, 0.1)]));
        assert_eq!(s.frame(), FrameOutcome::Rebuilt(Rebuild::Complete));
        assert!(s.registry().get(&EntityId::Index(3)).is_some());
        assert!(s.registry().get(&EntityId::Index(2)).is_none());
    }

    #[test]
    fn rebuild_disposes_each_previous_handle_once() {
        let mut s = session();
        let first = vec![footbot(1, 0.0, 0.0), footbot(2, 0.1, 0.1)];
        s.handle_transport(broadcast(first.clone()));
        s.frame();
        let old = visuals(&s);
        let first_ids = ids(&s);

        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0)]));
        s.frame();
        s.handle_transport(broadcast(first));
        s.frame();

        for v in &old {
            assert_eq!(s.backend().disposals(*v), 1, "visual {v:?}");
        }
        assert_eq!(ids(&s), first_ids);
        // proxies plus the stand-in ground plane
        assert_eq!(s.backend().visual_count(), s.registry().visual_count() + 1);
    }

    #[test]
    fn rebuild_releases_each_light_once() {
        let mut s = session();
        let scene = vec![light(1), footbot(2, 0.0, 0.0)];
        s.handle_transport(broadcast(scene.clone()));
        s.frame();
        assert_eq!(s.backend().light_count(), 1);
        let first = s.registry().get(&EntityId::Index(1)).unwrap().light.unwrap();

        s.handle_transport(broadcast(vec![light(1)]));
        assert_eq!(s.frame(), FrameOutcome::Rebuilt(Rebuild::Complete));
        let second = s.registry().get(&EntityId::Index(1)).unwrap().light.unwrap();
        assert_eq!(s.backend().light_disposals(first), 1);
        assert_eq!(s.backend().light_count(), 1);

        s.handle_transport(broadcast(scene));
        s.frame();
        assert_eq!(s.backend().light_disposals(first), 1);
        assert_eq!(s.backend().light_disposals(second), 1);
        assert_eq!(s.backend().light_count(), 1);

        s.teardown();
        assert_eq!(s.backend().light_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Asynchronous construction
    // -----------------------------------------------------------------------

    #[test]
    fn loading_skips_frames_until_barrier_completes() {
        let mut s = session();
        s.handle_transport(broadcast(vec![khepera(1), footbot(2, 0.0, 0.0)]));
        assert_eq!(s.frame(), FrameOutcome::Rebuilt(Rebuild::Pending(1)));
        assert_eq!(s.loop_state(), LoopState::Loading);
        assert_eq!(s.frame(), FrameOutcome::Loading);

        let requests = s.backend_mut().take_asset_requests();
        assert_eq!(requests.len(), 1);
        s.asset_loaded(requests[0].0, AssetOutcome::Loaded);

        assert_eq!(s.loop_state(), LoopState::Ready);
        assert_eq!(s.registry().len(), 2);
        let p = s.registry().get(&EntityId::Index(1)).unwrap();
        let shape = &s.backend().visual(p.visual.unwrap()).unwrap().shape;
        assert!(matches!(shape, Shape::Model { .. }));
        assert!(matches!(s.frame(), FrameOutcome::Updated(_)));
    }

    #[test]
    fn ids_changed_while_loading_rebuild_once_ready() {
        let mut s = session();
        s.handle_transport(broadcast(vec![khepera(1), footbot(2, 0.0, 0.0)]));
        assert_eq!(s.frame(), FrameOutcome::Rebuilt(Rebuild::Pending(1)));

        s.handle_transport(broadcast(vec![footbot(2, 0.0, 0.0), footbot(3, 0.1, 0.1)]));
        assert_eq!(s.frame(), FrameOutcome::Loading);
        assert_eq!(s.registry().generation(), 1);

        let requests = s.backend_mut().take_asset_requests();
        s.asset_loaded(requests[0].0, AssetOutcome::Loaded);
        assert_eq!(s.loop_state(), LoopState::Ready);
        let stale = visuals(&s);

        assert_eq!(s.frame(), FrameOutcome::Rebuilt(Rebuild::Complete));
        assert_eq!(s.registry().generation(), 2);
        let expected: BTreeSet<EntityId> = [EntityId::Index(2), EntityId::Index(3)].into();
        assert_eq!(ids(&s), expected);
        for v in &stale {
            assert_eq!(s.backend().disposals(*v), 1, "visual {v:?}");
        }
        assert!(matches!(s.frame(), FrameOutcome::Updated(_)));
    }

    #[test]
    fn failed_asset_still_completes_barrier() {
        let mut s = session();
        s.handle_transport(broadcast(vec![khepera(1)]));
        s.frame();

        let requests = s.backend_mut().take_asset_requests();
        s.asset_loaded(requests[0].0, AssetOutcome::Failed("404".into()));

        assert_eq!(s.loop_state(), LoopState::Ready);
        assert!(s.registry().get(&EntityId::Index(1)).unwrap().is_placeholder());
        // placeholder still counts, so the next frame is an update
        assert!(matches!(s.frame(), FrameOutcome::Updated(_)));
    }

    // -----------------------------------------------------------------------
    // Robustness
    // -----------------------------------------------------------------------

    #[test]
    fn null_and_malformed_entities_do_not_cause_rebuild_loops() {
        let mut s = session();
        let entities = vec![footbot(1, 0.0, 0.0), Value::Null, json!({"type": "box"})];
        s.handle_transport(broadcast(entities.clone()));
        s.frame();
        assert_eq!(s.registry().len(), 1);

        s.handle_transport(broadcast(entities));
        assert!(matches!(s.frame(), FrameOutcome::Updated(_)));
    }

    #[test]
    fn malformed_update_is_counted_and_skipped() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0), footbot(2, 0.1, 0.0)]));
        s.frame();

        let mut broken = footbot(2, 0.3, 0.0);
        broken["rays"] = json!(["garbage"]);
        s.handle_transport(broadcast(vec![footbot(1, 0.2, 0.0), broken]));
        let FrameOutcome::Updated(report) = s.frame() else {
            panic!("expected update");
        };
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 1);
        let p2 = s.registry().get(&EntityId::Index(2)).unwrap();
        assert_eq!(p2.transform.position, Vec3::new(0.1 * SCALE, 0.0, 0.0));
    }

    #[test]
    fn ground_plane_only_without_floor() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0)]));
        s.frame();
        let ground = s.ground().expect("ground plane");
        assert!(matches!(
            s.backend().visual(ground).unwrap().shape,
            Shape::Plane { texture: None, .. }
        ));

        let mut with_floor = session();
        with_floor.handle_transport(broadcast(vec![json!({"id": 0, "type": "floor"})]));
        with_floor.frame();
        assert!(with_floor.ground().is_none());
    }

    #[test]
    fn disconnect_keeps_scene() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0)]));
        s.frame();

        s.handle_transport(TransportEvent::Closed {
            reason: "gone".into(),
        });
        assert!(matches!(s.frame(), FrameOutcome::Updated(_)));
        assert_eq!(s.registry().len(), 1);
    }

    #[test]
    fn teardown_releases_everything() {
        let mut s = session();
        s.handle_transport(broadcast(vec![footbot(1, 0.0, 0.0), footbot(2, 0.1, 0.1)]));
        s.frame();

        s.teardown();
        assert_eq!(s.backend().visual_count(), 0);
        assert_eq!(s.loop_state(), LoopState::Idle);
    }
}

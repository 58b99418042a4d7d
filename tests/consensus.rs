use cascade::{
    consensus::{dag, engine, params::Params},
    p2p::wire::VertexMessage,
    sim::Simulator,
    Avalanche, Dag,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;
use std::{collections::HashSet, sync::Arc, time::Duration};

fn engine_with(params: Params, seed: u64) -> Avalanche {
    Avalanche::new(Arc::new(Dag::new()), params)
        .unwrap()
        .with_seed(seed)
}

fn small_params() -> Params {
    Params {
        k: 3,
        alpha: 2,
        beta_virtuous: 5,
        beta_rogue: 8,
        ..Params::default()
    }
}

#[tokio::test]
async fn single_vertex_self_finalizes() {
    let engine = engine_with(small_params(), 1);

    // Pre-seed three unrelated vertices so sampling is possible
    for i in 0..3 {
        engine
            .add_vertex(&format!("seed-{i}"), json!(format!("seed-{i}")), &[])
            .unwrap();
    }
    engine.add_vertex("v0", json!("payload"), &[]).unwrap();

    let mut finalized = false;
    for _ in 0..10_000 {
        engine.round().await;
        if engine.is_finalized("v0") {
            finalized = true;
            break;
        }
    }
    assert!(finalized, "v0 never finalized");
    assert!(!engine.is_pending("v0"));
    assert!(engine.get_vertex("v0").unwrap().finalized);
}

#[tokio::test]
async fn duplicate_submission_rejected() {
    let engine = engine_with(small_params(), 2);
    engine.add_vertex("vA", json!("original"), &[]).unwrap();
    let err = engine.add_vertex("vA", json!("replacement"), &[]).unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Dag(dag::Error::AlreadyExists)
    ));
    // The original vertex was not altered
    assert_eq!(engine.get_vertex("vA").unwrap().data, json!("original"));
    assert_eq!(engine.confidence("vA"), Some(0));
}

#[tokio::test]
async fn cycle_submission_rejected() {
    let engine = engine_with(small_params(), 3);
    engine.add_vertex("a", json!("a"), &[]).unwrap();
    engine.add_vertex("b", json!("b"), &["a".to_string()]).unwrap();
    engine.add_vertex("c", json!("c"), &["b".to_string()]).unwrap();

    let dag = engine.dag();
    assert_eq!(dag.add_edge("c", "a"), Err(dag::Error::WouldCreateCycle));

    // The rejected edge left the graph untouched
    assert!(dag.get_vertex("c").unwrap().children.is_empty());
    assert!(dag.get_vertex("a").unwrap().parents.is_empty());
    let roots: Vec<_> = dag.get_roots().into_iter().map(|v| v.id).collect();
    assert_eq!(roots, ["a"]);
}

#[tokio::test]
async fn rogue_threshold_dominates() {
    let params = Params {
        k: 3,
        alpha: 3,
        beta_virtuous: 2,
        beta_rogue: 4,
        ..Params::default()
    };
    let engine = engine_with(params, 4);

    for i in 0..3 {
        engine
            .add_vertex(&format!("f{i}"), json!(format!("filler-{i}")), &[])
            .unwrap();
    }
    // Same payload, distinct ids: these two conflict
    engine.add_vertex("vX", json!("T"), &[]).unwrap();
    engine.add_vertex("vY", json!("T"), &[]).unwrap();

    // Every sample endorses every target, so alpha is met in every round
    for vx in engine.get_all_vertices() {
        engine.dag().set_preferred(&vx.id, true).unwrap();
    }

    engine.round().await;
    engine.round().await;
    // Virtuous fillers finalize at beta_virtuous
    assert!(engine.is_finalized("f0"));
    assert!(engine.is_finalized("f1"));
    assert!(engine.is_finalized("f2"));
    // The conflicting pair must keep going
    assert!(!engine.is_finalized("vX"));
    assert!(!engine.is_finalized("vY"));

    engine.round().await;
    assert!(!engine.is_finalized("vX"));
    assert!(!engine.is_finalized("vY"));

    // beta_rogue reached
    engine.round().await;
    assert!(engine.is_finalized("vX"));
    assert!(engine.is_finalized("vY"));
}

#[tokio::test]
async fn rollback_on_unknown_parent() {
    let engine = engine_with(small_params(), 5);
    let err = engine
        .add_vertex("vZ", json!("z"), &["nonexistent".to_string()])
        .unwrap_err();
    assert!(matches!(err, engine::Error::Dag(dag::Error::NotFound)));

    // No orphan vertex left behind
    assert!(matches!(
        engine.get_vertex("vZ"),
        Err(engine::Error::Dag(dag::Error::NotFound))
    ));
    assert!(!engine.is_pending("vZ"));
    assert!(engine.get_all_vertices().is_empty());
}

#[tokio::test]
async fn gossip_redelivery_is_idempotent() {
    let mut sim = Simulator::new(small_params());
    sim.add_node("node-a").unwrap();
    sim.add_node("node-b").unwrap();
    sim.connect_all();

    let a = sim.node("node-a").unwrap().clone();
    let b = sim.node("node-b").unwrap().clone();
    a.propose_vertex("vG", json!("gossip"), &[]).unwrap();

    // Wait for the broadcast task to deliver
    let mut delivered = false;
    for _ in 0..100 {
        if b.engine().get_vertex("vG").is_ok() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "vG never reached node-b");

    let pending_before = b.engine().pending_ids();
    let finalized_before = b.engine().finalized_ids();

    // A redundant delivery of the same vertex is rejected as a duplicate and
    // changes nothing
    let msg = VertexMessage {
        id: "vG".to_string(),
        data: json!("gossip"),
        parent_ids: vec![],
        sender_id: "node-a".to_string(),
    };
    let err = b.receive_vertex(msg, None).unwrap_err();
    assert!(matches!(
        err,
        cascade::node::Error::Engine(engine::Error::Dag(dag::Error::AlreadyExists))
    ));
    assert_eq!(b.engine().pending_ids(), pending_before);
    assert_eq!(b.engine().finalized_ids(), finalized_before);
}

#[tokio::test]
async fn pending_and_finalized_stay_disjoint() {
    let engine = engine_with(
        Params {
            k: 3,
            alpha: 2,
            beta_virtuous: 2,
            beta_rogue: 4,
            ..Params::default()
        },
        6,
    );
    for i in 0..8 {
        engine
            .add_vertex(&format!("v{i}"), json!(i), &[])
            .unwrap();
    }
    for _ in 0..50 {
        engine.round().await;
        let pending: HashSet<_> = engine.pending_ids().into_iter().collect();
        let finalized: HashSet<_> = engine.finalized_ids().into_iter().collect();
        assert!(pending.is_disjoint(&finalized));
        // Everything tracked by the engine exists in the graph
        for id in pending.iter().chain(finalized.iter()) {
            assert!(engine.dag().contains(id));
        }
    }
}

#[tokio::test]
async fn finalization_is_monotonic() {
    let engine = engine_with(
        Params {
            k: 3,
            alpha: 2,
            beta_virtuous: 2,
            beta_rogue: 4,
            ..Params::default()
        },
        7,
    );
    for i in 0..4 {
        engine.add_vertex(&format!("v{i}"), json!(i), &[]).unwrap();
        engine.dag().set_preferred(&format!("v{i}"), true).unwrap();
    }
    engine.round().await;
    engine.round().await;
    assert!(engine.is_finalized("v0"));

    // Once decided, further rounds never revert the decision
    for _ in 0..20 {
        engine.round().await;
        assert!(engine.is_finalized("v0"));
        assert!(engine.get_vertex("v0").unwrap().finalized);
        assert!(!engine.is_pending("v0"));
    }
}

#[test]
fn acyclicity_holds_under_random_operations() {
    let dag = Dag::new();
    let mut rng = StdRng::seed_from_u64(8);
    let n = 50;
    for i in 0..n {
        dag.add_vertex(&format!("v{i}"), json!(i)).unwrap();
    }
    // Attempt a pile of random edges; rejected ones must leave no trace
    for _ in 0..500 {
        let a = format!("v{}", rng.gen_range(0..n));
        let b = format!("v{}", rng.gen_range(0..n));
        let _ = dag.add_edge(&a, &b);
    }
    for vx in dag.get_vertices() {
        assert!(
            !dag.is_ancestor(&vx.id, &vx.id),
            "{} reaches itself",
            vx.id
        );
    }
    // Edge symmetry held up as well
    for vx in dag.get_vertices() {
        for pid in &vx.parents {
            assert!(dag.get_vertex(pid).unwrap().children.contains(&vx.id));
        }
    }
}

#[test]
fn removal_promotes_orphaned_children() {
    let dag = Dag::new();
    for id in ["p", "c1", "c2", "q"] {
        dag.add_vertex(id, json!(id)).unwrap();
    }
    dag.add_edge("p", "c1").unwrap();
    dag.add_edge("p", "c2").unwrap();
    dag.add_edge("q", "c2").unwrap();

    dag.remove_vertex("p").unwrap();
    assert_eq!(dag.get_vertex("p"), Err(dag::Error::NotFound));

    let roots: HashSet<_> = dag.get_roots().into_iter().map(|v| v.id).collect();
    // c1 lost its only parent; c2 still hangs off q
    assert!(roots.contains("c1"));
    assert!(!roots.contains("c2"));
    assert!(roots.contains("q"));
}

#[tokio::test]
async fn confidence_advances_one_point_per_round() {
    let engine = engine_with(
        Params {
            k: 3,
            alpha: 2,
            beta_virtuous: 10,
            beta_rogue: 12,
            ..Params::default()
        },
        9,
    );
    for i in 0..4 {
        engine.add_vertex(&format!("v{i}"), json!(i), &[]).unwrap();
        engine.dag().set_preferred(&format!("v{i}"), true).unwrap();
    }
    for expected in 1..=5 {
        engine.round().await;
        assert_eq!(engine.confidence("v0"), Some(expected));
    }
}

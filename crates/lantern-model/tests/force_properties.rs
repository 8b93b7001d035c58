//! Property tests for forced edge evaluation.

use std::rc::Rc;

use lantern_model::driver::{RuntimeDriver, SpriteId};
use lantern_model::{CheckUtility, ProgramModel, SimDriver};
use proptest::prelude::*;

const BOWL: SpriteId = SpriteId(1);

fn model(edge_extra: &str, condition: &str) -> ProgramModel {
    let json = format!(
        r#"{{"id": "m", "usage": "program", "startNodeId": "a", "nodeIds": ["a", "b"],
            "edges": [{{"id": "e", "from": "a", "to": "b", {edge_extra}
                        "conditions": [{condition}]}}]}}"#
    );
    let loaded = lantern_compiler::load(&json).unwrap();
    ProgramModel::new(Rc::new(loaded.graphs.into_iter().next().unwrap()))
}

fn driver() -> SimDriver {
    let mut driver = SimDriver::new();
    let bowl = driver.add_sprite("Bowl");
    driver.add_variable(bowl, "Score", 0.0);
    driver.say(bowl, "hi");
    driver
}

#[test]
fn prop_event_edge_fires_exactly_at_force_step() {
    proptest!(|(at in 1u64..20)| {
        let mut m = model(&format!(r#""forceTestAt": {at},"#), r#"{"name": "Output", "args": ["Bowl", "hi"]}"#);
        let mut driver = driver();
        let mut utility = CheckUtility::new(false, 0, 1);
        prop_assert!(m.bind(&mut utility, &mut driver, 0).is_empty());

        for _ in 1..at {
            driver.step();
            let now = driver.total_steps();
            prop_assert!(m.step(&driver, &mut utility, now).taken.is_none());
            utility.reset();
        }
        driver.step();
        let now = driver.total_steps();
        let outcome = m.step(&driver, &mut utility, now);
        prop_assert_eq!(outcome.taken.map(|t| t.edge_id), Some("e".to_string()));
        prop_assert_eq!(now, at);
    });
}

#[test]
fn prop_force_after_fails_once_past_threshold() {
    proptest!(|(after in 0u64..15, extra in 1u64..5)| {
        let mut m = model(
            &format!(r#""forceTestAfter": {after},"#),
            r#"{"name": "VarComp", "args": ["Bowl", "Score", ">", "0"]}"#,
        );
        let mut driver = driver();
        let mut utility = CheckUtility::new(false, 0, 1);
        m.bind(&mut utility, &mut driver, 0);

        let mut failed_at = Vec::new();
        for _ in 0..after + extra {
            driver.step();
            let now = driver.total_steps();
            if !m.step(&driver, &mut utility, now).failures.is_empty() {
                failed_at.push(now);
            }
            utility.reset();
        }
        prop_assert_eq!(failed_at, vec![after + 1]);
        prop_assert_eq!(m.current_node_id(), "a");
        prop_assert!(driver.variable(BOWL, "Score").is_some());
    });
}

use lantern_compiler::graph::ModelGraph;
use lantern_model::bind::Timing;
use lantern_model::driver::{RuntimeDriver, SpriteId};
use lantern_model::{CheckUtility, SimDriver};

const BOWL: SpriteId = SpriteId(1);

fn graph_with_effects(id: &str, effects: &str) -> ModelGraph {
    let json = format!(
        r#"{{"id": "{id}", "usage": "program", "startNodeId": "a", "nodeIds": ["a", "b"],
            "edges": [{{"id": "e", "from": "a", "to": "b",
                        "conditions": [{{"name": "Function", "args": ["true"]}}],
                        "effects": {effects}}}]}}"#
    );
    let loaded = lantern_compiler::load(&json);
    assert!(loaded.is_ok(), "Load failed: {:?}", loaded.as_ref().err());
    loaded.unwrap().graphs.remove(0)
}

fn driver() -> SimDriver {
    let mut driver = SimDriver::new();
    let bowl = driver.add_sprite("Bowl");
    driver.add_variable(bowl, "Score", 0.0);
    driver
}

fn take(utility: &mut CheckUtility, driver: &mut SimDriver, graph: &ModelGraph) {
    for edge in graph.edges() {
        assert!(utility.register_effect_checks(&graph.id, edge, driver).is_empty());
        utility.effect_taken(&graph.id, &edge.id, Timing::default());
    }
}

#[test]
fn test_contradicting_effects_are_reported_not_checked() {
    let g = graph_with_effects(
        "m",
        r#"[{"name": "VarComp", "args": ["Bowl", "Score", "=", "1"]},
            {"name": "VarComp", "args": ["Bowl", "Score", "=", "2"]}]"#,
    );
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 0);
    take(&mut utility, &mut driver, &g);

    let report = utility.check_effects(&driver);
    assert_eq!(report.contradictions.len(), 1);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert!(!utility.has_pending());
}

#[test]
fn test_contradictions_span_models() {
    let g1 = graph_with_effects("m1", r#"[{"name": "VarChange", "args": ["Bowl", "Score", "+"]}]"#);
    let g2 = graph_with_effects("m2", r#"[{"name": "VarChange", "args": ["Bowl", "Score", "-"]}]"#);
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 0);
    take(&mut utility, &mut driver, &g1);
    take(&mut utility, &mut driver, &g2);

    let report = utility.check_effects(&driver);
    assert_eq!(report.contradictions.len(), 1);
    assert!(report.contradictions[0].contains("m1"));
    assert!(report.contradictions[0].contains("m2"));
}

#[test]
fn test_failed_effect_is_rechecked_before_reporting() {
    let g = graph_with_effects("m", r#"[{"name": "VarComp", "args": ["Bowl", "Score", "=", "1"]}]"#);
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 1);
    take(&mut utility, &mut driver, &g);

    let report = utility.check_effects(&driver);
    assert!(report.is_empty());
    assert!(utility.has_pending());

    // The program catches up one step later.
    driver.set_variable(BOWL, "Score", 1.0.into());
    let report = utility.check_failed_effects(&driver);
    assert!(report.is_empty());
    assert!(!utility.has_pending());
}

#[test]
fn test_effect_failure_message() {
    let g = graph_with_effects("m", r#"[{"name": "VarComp", "args": ["Bowl", "Score", "=", "1"]}]"#);
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 2);
    take(&mut utility, &mut driver, &g);

    assert!(utility.check_effects(&driver).is_empty());
    assert!(utility.check_failed_effects(&driver).is_empty());
    let report = utility.check_failed_effects(&driver);
    assert_eq!(
        report.failures,
        vec!["Effect failed! Model=m. Edge=e. Effect=VarComp(Bowl,Score,=,1)".to_string()]
    );
    assert!(!utility.has_pending());
}

#[test]
fn test_no_recheck_fails_immediately() {
    let g = graph_with_effects("m", r#"[{"name": "VarComp", "args": ["Bowl", "Score", "=", "1"]}]"#);
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 0);
    take(&mut utility, &mut driver, &g);
    assert_eq!(utility.check_effects(&driver).failures.len(), 1);
}

#[test]
fn test_flush_reports_all_pending() {
    let g = graph_with_effects("m", r#"[{"name": "VarComp", "args": ["Bowl", "Score", "=", "1"]}]"#);
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 5);
    take(&mut utility, &mut driver, &g);
    utility.check_effects(&driver);

    let report = utility.flush(&driver);
    assert_eq!(report.failures.len(), 1);
    assert!(!utility.has_pending());
}

#[test]
fn test_effect_eval_error_is_an_error() {
    let g = graph_with_effects("m", r#"[{"name": "AttrComp", "args": ["Bowl", "costume", "<", "1"]}]"#);
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 1);
    take(&mut utility, &mut driver, &g);

    let report = utility.check_effects(&driver);
    assert_eq!(report.errors.len(), 1);
    assert!(report.failures.is_empty());
}

#[test]
fn test_teardown_removes_listeners() {
    let g = graph_with_effects(
        "m",
        r#"[{"name": "Output", "args": ["Bowl", "hi"]},
            {"name": "SpriteTouching", "args": ["Bowl", "Stage"]}]"#,
    );
    let mut driver = driver();
    let mut utility = CheckUtility::new(false, 0, 1);
    take(&mut utility, &mut driver, &g);
    assert_eq!(driver.listener_count(), 3);
    assert_eq!(utility.subscription_count(), 3);

    utility.teardown(&mut driver);
    assert_eq!(driver.listener_count(), 0);
    assert_eq!(utility.subscription_count(), 0);
}

#[test]
fn test_recheck_measures_run_time_at_recheck() {
    let g = graph_with_effects("m", r#"[{"name": "TimeElapsed", "args": ["300"]}]"#);
    let mut driver = driver().with_step_millis(100.0);
    let mut utility = CheckUtility::new(false, 0, 5);
    utility.start_run(driver.total_steps());
    take(&mut utility, &mut driver, &g);

    driver.step();
    assert!(utility.check_effects(&driver).is_empty());
    assert!(utility.has_pending());

    driver.run_steps(2);
    let report = utility.check_failed_effects(&driver);
    assert!(report.is_empty(), "{:?}", report);
    assert!(!utility.has_pending());
}

#[test]
fn test_recheck_sees_program_end_reached_later() {
    let g = graph_with_effects("m", r#"[{"name": "TimeAfterEnd", "args": ["100"]}]"#);
    let mut driver = driver().with_step_millis(100.0);
    let mut utility = CheckUtility::new(false, 0, 5);
    utility.start_run(driver.total_steps());
    take(&mut utility, &mut driver, &g);

    assert!(utility.check_effects(&driver).is_empty());
    assert!(utility.has_pending());

    utility.set_program_end(driver.total_steps());
    driver.step();
    let report = utility.check_failed_effects(&driver);
    assert!(report.is_empty(), "{:?}", report);
    assert!(!utility.has_pending());
}

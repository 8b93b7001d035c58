use lantern_core::{ModelTester, TesterConfig, TesterError};
use lantern_model::driver::{RuntimeDriver, SpriteId};
use lantern_model::SimDriver;

const BOWL: SpriteId = SpriteId(1);

fn fruit_catcher_driver() -> SimDriver {
    let mut driver = SimDriver::new();
    let stage = driver.stage();
    driver.add_variable(stage, "Score", 0.0);
    driver.add_variable(stage, "Time", 3.0);
    let bowl = driver.add_sprite("Bowl");
    assert_eq!(bowl, BOWL);
    driver
}

fn loaded(json: &str) -> ModelTester {
    let mut tester = ModelTester::new();
    let report = tester.load(json);
    assert!(report.is_ok(), "Load failed: {:?}", report.as_ref().err());
    tester
}

#[test]
fn test_single_edge_model_stops() {
    let mut tester = loaded(
        r#"{"usage":"program","startNodeId":"a","stopNodeIds":["b"],"nodeIds":["a","b"],
            "edges":[{"id":"e1","from":"a","to":"b","conditions":[{"name":"Function","negated":false,"args":["true"]}]}]}"#,
    );
    let mut driver = SimDriver::new();
    let prepared = tester.prepare(&mut driver, false);
    assert!(prepared.is_ok(), "Prepare failed: {:?}", prepared.as_ref().err());
    assert!(tester.running());

    driver.step();
    assert!(!tester.running());
    assert_eq!(driver.step_callback_count(), 0);

    let result = tester.get_model_states(&mut driver);
    assert!(result.is_success(), "{:?}", result.errors);
    assert_eq!(result.edge_trace.len(), 1);
    assert!(result.log.contains(&"Model graph0 stopped at node b".to_string()), "{:?}", result.log);
    assert_eq!(result.coverage["graph0"].covered, 1);
    assert_eq!(result.coverage["graph0"].total, 1);
}

#[test]
fn test_load_report_counts_usages() {
    let mut tester = ModelTester::new();
    let report = tester.load(include_str!("../../lantern-ir/tests/fixtures/fruit_catcher.json")).unwrap();
    assert_eq!((report.program_models, report.user_models, report.end_models), (1, 1, 1));
    assert!(report.warnings.is_empty());
    assert!(tester.program_models_loaded());
    assert!(tester.user_models_loaded());
    assert!(tester.end_models_loaded());
}

#[test]
fn test_load_rejects_invalid_json() {
    let mut tester = ModelTester::new();
    assert!(matches!(tester.load("not json"), Err(TesterError::Load(_))));
    assert!(!tester.program_models_loaded());
}

#[test]
fn test_prepare_without_graphs_fails() {
    let mut tester = ModelTester::new();
    let mut driver = SimDriver::new();
    assert!(matches!(tester.prepare(&mut driver, false), Err(TesterError::NotLoaded)));
    assert_eq!(driver.step_callback_count(), 0);
}

#[test]
fn test_fruit_catcher_run() {
    let mut tester = loaded(include_str!("../../lantern-ir/tests/fixtures/fruit_catcher.json"));
    let mut driver = fruit_catcher_driver();
    tester.prepare(&mut driver, false).unwrap();
    assert_eq!(driver.step_callback_count(), 2);

    // The user presses left, the game starts.
    driver.step();
    assert!(driver.is_key_down("left arrow"));

    // A fruit is caught.
    driver.step_with(|d| {
        let stage = d.stage();
        d.set_variable(stage, "Score", 1.0.into());
    });

    // Time is up.
    driver.step_with(|d| {
        let stage = d.stage();
        d.set_variable(stage, "Time", 0.0.into());
        d.say(BOWL, "Game over");
    });
    assert!(tester.running());

    // End models run once the program models stopped.
    driver.step();
    assert!(!tester.running());

    let result = tester.get_model_states(&mut driver);
    assert!(result.is_success(), "errors {:?} failures {:?}", result.errors, result.failures);
    assert_eq!(result.edge_trace.len(), 5, "{:?}", result.edge_trace);
    assert!(result.edge_trace[0].starts_with("steering: "));
    assert!(result.edge_trace[4].starts_with("final: "));
    assert!(result.final_state.contains(&"Stage.Score = 1".to_string()), "{:?}", result.final_state);
    assert_eq!(result.coverage["catching"].covered, 3);
    assert_eq!(driver.step_callback_count(), 0);
    assert_eq!(driver.listener_count(), 0);
}

const SCORE_EFFECT: &str = r#"{"id": "m", "usage": "program", "startNodeId": "a", "stopNodeIds": ["b"],
    "nodeIds": ["a", "b"],
    "edges": [{"id": "e", "from": "a", "to": "b",
               "conditions": [{"name": "Function", "args": ["true"]}],
               "effects": [{"name": "VarComp", "args": ["Bowl", "Score", "=", "1"]}]}]}"#;

fn score_driver() -> SimDriver {
    let mut driver = SimDriver::new();
    let bowl = driver.add_sprite("Bowl");
    driver.add_variable(bowl, "Score", 0.0);
    driver
}

#[test]
fn test_late_effect_passes_within_recheck() {
    let mut tester = loaded(SCORE_EFFECT);
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();

    driver.step();
    assert!(tester.running(), "pending effect keeps the run alive");
    driver.step_with(|d| {
        d.set_variable(BOWL, "Score", 1.0.into());
    });
    assert!(!tester.running());

    let result = tester.get_model_states(&mut driver);
    assert!(result.failures.is_empty(), "{:?}", result.failures);
}

#[test]
fn test_effect_failure_reported_after_recheck() {
    let mut tester = loaded(SCORE_EFFECT);
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();

    driver.run_steps(2);
    assert!(!tester.running());

    let result = tester.get_model_states(&mut driver);
    assert_eq!(
        result.failures,
        vec!["Effect failed! Model=m. Edge=e. Effect=VarComp(Bowl,Score,=,1)".to_string()]
    );
    assert!(!result.is_success());
}

#[test]
fn test_pending_effects_flushed_on_result() {
    let mut tester = ModelTester::with_config(TesterConfig {
        effect_recheck_steps: 5,
        ..Default::default()
    });
    tester.load(SCORE_EFFECT).unwrap();
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();

    driver.step();
    assert!(tester.running());
    let result = tester.get_model_states(&mut driver);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(driver.step_callback_count(), 0);
}

const MISSING_SPRITE: &str = r#"{"id": "m", "usage": "program", "startNodeId": "a", "stopNodeIds": ["b"],
    "nodeIds": ["a", "b"],
    "edges": [{"id": "e", "from": "a", "to": "b",
               "conditions": [{"name": "VarComp", "args": ["Basket", "Score", "=", "0"]}]},
              {"id": "f", "from": "a", "to": "b",
               "conditions": [{"name": "Function", "args": ["true"]}]}]}"#;

#[test]
fn test_binding_error_halts_run() {
    let mut tester = loaded(MISSING_SPRITE);
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();
    assert!(!tester.running());
    assert_eq!(driver.step_callback_count(), 0);
    assert_eq!(driver.listener_count(), 0);

    driver.step();
    let result = tester.get_model_states(&mut driver);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("Basket"), "{}", result.errors[0]);
    assert!(result.edge_trace.is_empty());
}

#[test]
fn test_binding_error_can_be_tolerated() {
    let mut tester = ModelTester::with_config(TesterConfig {
        halt_on_binding_error: false,
        ..Default::default()
    });
    tester.load(MISSING_SPRITE).unwrap();
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();
    assert!(tester.running());

    driver.step();
    let result = tester.get_model_states(&mut driver);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.edge_trace.len(), 1);
    assert!(result.edge_trace[0].starts_with("m: "));
}

#[test]
fn test_program_end_starts_end_models() {
    let mut tester = loaded(
        r#"[{"id": "game", "usage": "program", "startNodeId": "a", "nodeIds": ["a", "b"],
             "edges": [{"id": "win", "from": "a", "to": "b",
                        "conditions": [{"name": "VarComp", "args": ["Bowl", "Score", ">", "5"]}]}]},
            {"id": "after", "usage": "end", "startNodeId": "wait", "stopNodeIds": ["done"],
             "nodeIds": ["wait", "done"],
             "edges": [{"id": "settled", "from": "wait", "to": "done",
                        "conditions": [{"name": "TimeAfterEnd", "args": ["100"]}]}]}]"#,
    );
    let mut driver = score_driver().with_step_millis(50.0);
    tester.prepare(&mut driver, false).unwrap();

    driver.run_steps(2);
    assert!(tester.running());
    tester.on_program_end(&driver);

    driver.step();
    assert!(tester.running());
    driver.step();
    assert!(!tester.running());

    let result = tester.get_model_states(&mut driver);
    assert_eq!(result.edge_trace.len(), 1);
    assert!(result.edge_trace[0].starts_with("after: "));
    assert_eq!(result.coverage["game"].covered, 0);
    assert_eq!(result.coverage["after"].covered, 1);
}

#[test]
fn test_stop_all_node_ends_program_phase() {
    let mut tester = loaded(
        r#"[{"id": "quitter", "usage": "program", "startNodeId": "a", "stopAllNodeIds": ["quit"],
             "nodeIds": ["a", "quit"],
             "edges": [{"id": "q", "from": "a", "to": "quit", "conditions": [{"name": "Function", "args": ["true"]}]}]},
            {"id": "waiter", "usage": "program", "startNodeId": "a", "nodeIds": ["a", "b"],
             "edges": [{"id": "w", "from": "a", "to": "b",
                        "conditions": [{"name": "VarComp", "args": ["Bowl", "Score", ">", "5"]}]}]}]"#,
    );
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();

    driver.step();
    assert!(!tester.running());
    let result = tester.get_model_states(&mut driver);
    assert!(result.log.contains(&"Model quitter stopped at node quit".to_string()), "{:?}", result.log);
}

#[test]
fn test_total_coverage_accumulates_over_runs() {
    let mut tester = loaded(
        r#"{"id": "m", "usage": "program", "startNodeId": "a", "stopNodeIds": ["hi", "lo"],
            "nodeIds": ["a", "hi", "lo"],
            "edges": [
              {"id": "high", "from": "a", "to": "hi", "conditions": [{"name": "VarComp", "args": ["Bowl", "Score", ">", "0"]}]},
              {"id": "low", "from": "a", "to": "lo", "conditions": [{"name": "VarComp", "args": ["Bowl", "Score", "<=", "0"]}]}
            ]}"#,
    );
    let mut driver = score_driver();

    tester.prepare(&mut driver, false).unwrap();
    driver.step();
    let first = tester.get_model_states(&mut driver);
    assert_eq!(first.coverage["m"].covered, 1);

    let total = tester.get_total_coverage();
    assert_eq!(total["m"].covered, vec!["low".to_string()]);
    assert_eq!(total["m"].missed, vec!["high".to_string()]);

    driver.set_variable(BOWL, "Score", 3.0.into());
    tester.prepare(&mut driver, false).unwrap();
    driver.step();
    let second = tester.get_model_states(&mut driver);
    assert_eq!(second.coverage["m"].covered, 1);

    let total = tester.get_total_coverage();
    assert_eq!(total["m"].covered.len(), 2);
    assert!(total["m"].missed.is_empty());
    assert_eq!(total["m"].total, 2);

    tester.reset_total_coverage();
    assert!(tester.get_total_coverage()["m"].covered.is_empty());
}

#[test]
fn test_contradictions_are_not_failures() {
    let mut tester = loaded(
        r#"{"id": "m", "usage": "program", "startNodeId": "a", "stopNodeIds": ["b"],
            "nodeIds": ["a", "b"],
            "edges": [{"id": "e", "from": "a", "to": "b",
                       "conditions": [{"name": "Function", "args": ["true"]}],
                       "effects": [{"name": "VarComp", "args": ["Bowl", "Score", "=", "1"]},
                                   {"name": "VarComp", "args": ["Bowl", "Score", "=", "2"]}]}]}"#,
    );
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();
    driver.step();

    let result = tester.get_model_states(&mut driver);
    assert_eq!(result.contradictions.len(), 1);
    assert!(result.failures.is_empty());
    assert!(result.is_success());
}

#[test]
fn test_contradictions_across_name_spellings() {
    let mut tester = loaded(
        r#"{"id": "m", "usage": "program", "startNodeId": "a", "stopNodeIds": ["b"],
            "nodeIds": ["a", "b"],
            "edges": [{"id": "e", "from": "a", "to": "b",
                       "conditions": [{"name": "Function", "args": ["true"]}],
                       "effects": [{"name": "AttrComp", "args": ["bowl", "x", ">", "5"]},
                                   {"name": "AttrComp", "args": ["Bowl", "x", "<", "2"]}]}]}"#,
    );
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();
    driver.step_with(|d| d.move_to(BOWL, 10.0, 0.0));

    let result = tester.get_model_states(&mut driver);
    assert_eq!(result.contradictions.len(), 1, "{:?}", result.failures);
    assert!(result.failures.is_empty(), "{:?}", result.failures);
}

#[test]
fn test_result_serializes() {
    let mut tester = loaded(SCORE_EFFECT);
    let mut driver = score_driver();
    tester.prepare(&mut driver, false).unwrap();
    driver.run_steps(2);
    let result = tester.get_model_states(&mut driver);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["failures"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(json["coverage"]["m"]["covered"], 1);
}

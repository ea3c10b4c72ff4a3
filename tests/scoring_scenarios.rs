//! End-to-end goal configuration scenarios
//!
//! Each test drives a goal the way the editing surface does: measurements
//! come in as form strings, the formula as text, and scores are checked
//! against hand-computed values.

use appraisal_scoring::form::keys;
use appraisal_scoring::{
    FieldError, FormulaError, GoalScoring, ManagerError, MeasurementForm, MeasurementId,
    PlaceholderValues, ScoringError, ScoringState,
};
use rust_decimal::Decimal;

fn number_form(name: &str, weight: &str) -> MeasurementForm {
    MeasurementForm::new(name, "number")
        .weight(weight)
        .field(keys::MIN, "0")
        .field(keys::MAX, "5")
}

fn add(goal: &mut GoalScoring, form: MeasurementForm) -> MeasurementId {
    let draft = form.to_draft().expect("form should read");
    goal.add(draft).expect("measurement should be accepted").measurement_id
}

fn values(raw: &[f64]) -> PlaceholderValues {
    raw.iter().copied().collect()
}

#[test]
fn weights_summing_to_one_hundred_are_valid() {
    let mut goal = GoalScoring::default();
    add(&mut goal, number_form("Customer satisfaction", "60"));
    add(&mut goal, number_form("Tickets resolved", "40"));

    let set = goal.measurements();
    assert_eq!(set.total_weight(), Decimal::ONE_HUNDRED);
    assert!(set.is_weight_valid());
    assert_eq!(set.remaining_weight(), Decimal::ZERO);
}

#[test]
fn weighted_formula_evaluates() {
    let mut goal = GoalScoring::default();
    add(&mut goal, number_form("Customer satisfaction", "60"));
    add(&mut goal, number_form("Tickets resolved", "40"));

    let diagnostics = goal.set_formula("(M1*0.6)+(M2*0.4)");
    assert!(diagnostics.is_empty());
    assert_eq!(goal.state(), ScoringState::Scorable);

    let score = goal.evaluate(&values(&[4.0, 5.0])).unwrap();
    assert!((score - 4.4).abs() < 1e-9);
}

#[test]
fn reorder_rebinds_placeholders() {
    let mut goal = GoalScoring::default();
    let first = add(&mut goal, number_form("Customer satisfaction", "60"));
    let second = add(&mut goal, number_form("Tickets resolved", "40"));
    goal.set_formula("(M1*0.6)+(M2*0.4)");

    let receipt = goal.reorder(1, 0).unwrap();
    assert!(receipt.formula_stale);
    assert_eq!(goal.measurements().placeholder_of(&second).as_deref(), Some("M1"));
    assert_eq!(goal.measurements().placeholder_of(&first).as_deref(), Some("M2"));

    // Raw values follow their measurements: old-M2 had 5, old-M1 had 4
    let score = goal.evaluate(&values(&[5.0, 4.0])).unwrap();
    assert!((score - 4.6).abs() < 1e-9);
    assert_eq!(goal.formula(), Some("(M1*0.6)+(M2*0.4)"));
}

#[test]
fn removal_invalidates_formula_referencing_last_placeholder() {
    let mut goal = GoalScoring::default();
    let first = add(&mut goal, number_form("A", "30"));
    add(&mut goal, number_form("B", "30"));
    add(&mut goal, number_form("C", "40"));
    goal.set_formula("M1+M2+M3");

    let (removed, receipt) = goal.remove(&first).unwrap();
    assert_eq!(removed.name, "A");
    assert_eq!(goal.measurements().len(), 2);
    let moves: Vec<String> = receipt.renumbered.iter().map(ToString::to_string).collect();
    assert_eq!(moves, vec!["M2 -> M1", "M3 -> M2"]);
    assert_eq!(receipt.budget.total, Decimal::new(70, 0));
    assert_eq!(goal.measurements().total_weight(), Decimal::new(70, 0));
    assert_eq!(goal.measurements().remaining_weight(), Decimal::new(30, 0));

    match goal.evaluate(&values(&[1.0, 2.0])) {
        Err(ScoringError::Formula(FormulaError::PlaceholderOutOfRange { name, count, .. })) => {
            assert_eq!(name, "M3");
            assert_eq!(count, 2);
        }
        other => panic!("Expected reference error for M3, got {:?}", other),
    }
    assert_eq!(goal.formula(), Some("M1+M2+M3"));
    assert_eq!(goal.state(), ScoringState::Configuring);
}

#[test]
fn binary_without_scores_is_rejected() {
    let mut goal = GoalScoring::default();
    let draft = MeasurementForm::new("Compliance audit", "binary")
        .weight("20")
        .field(keys::OPTION_A, "Pass")
        .field(keys::OPTION_B, "Fail")
        .to_draft()
        .unwrap();

    match goal.add(draft) {
        Err(ManagerError::Invalid(report)) => {
            assert!(report.errors.contains(&FieldError::Missing { field: "trueScore" }));
            assert!(report.errors.contains(&FieldError::Missing { field: "falseScore" }));
        }
        other => panic!("Expected validation failure, got {:?}", other),
    }
    assert!(goal.measurements().is_empty());
}

#[test]
fn over_budget_weights_are_kept_and_flagged() {
    let mut goal = GoalScoring::default();
    add(&mut goal, number_form("A", "70"));
    let receipt = goal
        .add(number_form("B", "50").to_draft().unwrap())
        .unwrap();

    assert!(!receipt.budget.valid);
    assert_eq!(goal.measurements().len(), 2);
    assert!(!goal.measurements().is_weight_valid());
    assert_eq!(goal.measurements().total_weight(), Decimal::new(120, 0));
}

#[test]
fn formula_cannot_reach_outside_its_scope() {
    let mut goal = GoalScoring::default();
    add(&mut goal, number_form("A", "100"));

    for hostile in [
        "process.exit(1)",
        "M1; drop()",
        "eval('1')",
        "constructor",
        "M1 + `1`",
    ] {
        goal.set_formula(hostile);
        assert!(
            goal.evaluate(&values(&[1.0])).is_err(),
            "{} should not evaluate",
            hostile
        );
    }
}

#[test]
fn custom_measurement_scores_through_its_expression() {
    use appraisal_scoring::{MeasurementOutcome, Outcomes};

    let mut goal = GoalScoring::default();
    let id = add(
        &mut goal,
        MeasurementForm::new("Uptime rating", "custom")
            .weight("100")
            .field(keys::EXPRESSION, "(x > 99.9) ? 5 : (x > 99) ? 4 : 2"),
    );
    goal.set_formula("M1");

    let outcomes: Outcomes = [(id, MeasurementOutcome::Value(99.5))].into_iter().collect();
    let scored = goal.score(&outcomes).unwrap();
    assert_eq!(scored.score, 4.0);
    assert_eq!(scored.bindings[0].placeholder, "M1");
}

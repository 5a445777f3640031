mod common;

use anyhow::Result;
use plan_critic::{decide, extract, train, CalibratedModel, GateConfig, Outcome, SufficiencyModel};

/// Train on a pooled set of both dialogue shapes, then ask the gate about a
/// finished dialogue. Both collections are pooled and re-split here.
#[test]
fn integration_train_then_decide() -> Result<()> {
    let records = common::pool(60, 60);
    let artifact = train(&records, &[], 0.2, 42)?;

    let m = &artifact.metrics;
    assert!(m.resplit);
    assert_eq!(m.train_size + m.valid_size, 120);
    assert_eq!(m.valid_class_counts, [12, 12]);
    assert!(!m.calibration_fallback);
    assert!(m.vocabulary_size > 0);
    assert!(m.valid_f1 > 0.99, "valid F1 {}", m.valid_f1);

    let live = common::live_record();
    let p = artifact
        .score(&plan_critic::feature_text(&live))?
        .probability()
        .expect("finite probability");
    assert!(p >= artifact.threshold(), "p={p} threshold={}", artifact.threshold());

    let decision = decide(&artifact, &live, 0, &GateConfig::default())?;
    assert_eq!(decision.outcome, Outcome::Sufficient);
    assert!(decision.context.has_plan);

    // A bare instruction on the first turn keeps the dialogue going.
    let early = common::insufficient(0);
    let decision = decide(&artifact, &early, 0, &GateConfig::default())?;
    assert_eq!(decision.outcome, Outcome::Continue);
    Ok(())
}

/// Separate train/valid collections are used as given.
#[test]
fn integration_given_split_is_kept() -> Result<()> {
    let artifact = train(&common::pool(40, 40), &common::pool(10, 12), 0.2, 42)?;
    assert!(!artifact.metrics.resplit);
    assert_eq!(artifact.metrics.train_size, 80);
    assert_eq!(artifact.metrics.valid_class_counts, [12, 10]);
    Ok(())
}

/// Extraction used for training and for the gate is the same function.
#[test]
fn integration_extraction_is_shared() {
    let live = common::live_record();
    let (text, label) = extract(&live);
    assert_eq!(text, plan_critic::feature_text(&live));
    assert_eq!(label, 1);
    assert_eq!(
        text,
        "Instruction: Tidy the table | FunctionSequence: <Plan>...</Plan> | \
         ClarifyingHistory: Q: Which room? A: Kitchen | Information: room=kitchen"
    );
}

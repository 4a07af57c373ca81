//! End-to-end pipeline tests over scripted backends and temp-dir stores.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::Ordering;

use appraise_core::{
    AssessmentStore, CacheStatus, Codebook, Judgment, PaperRecord, ResponseCache,
};
use appraise_llm::{
    AssessmentPipeline, MockArbiter, MockEvaluator, PipelineOptions,
};

const CODEBOOK: &str = r#"{
    "Failure Severity": {
        "description": "Severity of surfaced failures",
        "values": [
            { "value": "High", "description": "crashes" },
            { "value": "Medium", "description": "deviations" },
            { "value": "Low", "description": "cosmetic" }
        ]
    }
}"#;

struct Fixture {
    _dir: tempfile::TempDir,
    papers_dir: std::path::PathBuf,
    store_path: std::path::PathBuf,
    cache_dir: std::path::PathBuf,
    codebook: Codebook,
}

impl Fixture {
    fn new() -> Self {
        Self::with_codebook(CODEBOOK)
    }

    fn with_codebook(codebook: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let papers_dir = dir.path().join("papers");
        std::fs::create_dir_all(&papers_dir).unwrap();
        std::fs::write(papers_dir.join("smith2021fuzz.pdf"), b"%PDF-1.4 stub").unwrap();

        let store_path = dir.path().join("assessments.json");
        Self::seed_store(&store_path);

        Self {
            cache_dir: dir.path().join("llm_responses"),
            papers_dir,
            store_path,
            codebook: Codebook::from_json_str(codebook).unwrap(),
            _dir: dir,
        }
    }

    fn seed_store(path: &Path) {
        let mut papers = BTreeMap::new();
        papers.insert(
            "smith2021fuzz".to_string(),
            PaperRecord {
                name: "Fuzzing the Planner".to_string(),
                key: "smith2021".to_string(),
                year: 2021,
                citation_count: 17,
                ..Default::default()
            },
        );
        std::fs::write(path, serde_json::to_string_pretty(&papers).unwrap()).unwrap();
    }

    fn store(&self) -> AssessmentStore {
        AssessmentStore::load(&self.store_path).unwrap()
    }

    fn cache(&self) -> ResponseCache {
        ResponseCache::open(&self.cache_dir).unwrap()
    }

    fn run(
        &self,
        evaluator_a: MockEvaluator,
        evaluator_b: MockEvaluator,
        arbiter: MockArbiter,
        options: PipelineOptions,
    ) -> (appraise_llm::RunSummary, AssessmentStore) {
        let mut store = self.store();
        let cache = self.cache();
        let summary = AssessmentPipeline::new(
            &self.codebook,
            &mut store,
            &cache,
            Box::new(evaluator_a),
            Box::new(evaluator_b),
            Box::new(arbiter),
            options,
        )
        .run(&self.papers_dir)
        .unwrap();
        (summary, store)
    }

    fn arbitrator_value(&self, store: &AssessmentStore) -> String {
        store.get("smith2021fuzz").unwrap().assessments["Failure Severity"]
            .arbitrator
            .as_ref()
            .unwrap()
            .value
            .clone()
    }
}

#[test]
fn agreement_finalizes_without_arbitration() {
    let fx = Fixture::new();
    let arbiter = MockArbiter::returning_value("should-not-be-used");
    let arbiter_calls = arbiter.call_counter();

    let (summary, store) = fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("High"),
        arbiter,
        PipelineOptions::default(),
    );

    assert_eq!(summary.metrics_finalized, 1);
    assert_eq!(arbiter_calls.load(Ordering::SeqCst), 0);

    let entry = &store.get("smith2021fuzz").unwrap().assessments["Failure Severity"];
    assert_eq!(entry.arbitrator, entry.evaluator_a);
    assert_eq!(entry.arbitrator.as_ref().unwrap().value, "High");
    // The empty manual placeholder exists and is untouched.
    assert!(entry.manual.is_empty());
}

#[test]
fn disagreement_invokes_arbitration_exactly_once() {
    let fx = Fixture::new();
    let arbiter = MockArbiter::returning_value("Medium");
    let arbiter_calls = arbiter.call_counter();

    let (summary, store) = fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("Low"),
        arbiter,
        PipelineOptions::default(),
    );

    assert_eq!(summary.metrics_finalized, 1);
    assert_eq!(arbiter_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.arbitrator_value(&store), "Medium");
}

#[test]
fn metrics_are_assessed_independently() {
    const TWO_METRICS: &str = r#"{
        "Failure Severity": {
            "description": "",
            "values": [
                { "value": "High", "description": "" },
                { "value": "Low", "description": "" }
            ]
        },
        "Input Plausibility": {
            "description": "",
            "values": [
                { "value": "High", "description": "" },
                { "value": "Low", "description": "" }
            ]
        }
    }"#;
    let fx = Fixture::with_codebook(TWO_METRICS);

    let judgment = |value: &str| format!("{{\"value\": \"{value}\", \"rationale\": \"\", \"evidence\": \"\"}}");
    let arbiter = MockArbiter::returning_value("Low");
    let arbiter_calls = arbiter.call_counter();

    // Agreement on severity, disagreement on plausibility.
    let (summary, store) = fx.run(
        MockEvaluator::new("a")
            .with_response("Failure Severity", judgment("High"))
            .with_response("Input Plausibility", judgment("High")),
        MockEvaluator::new("b")
            .with_response("Failure Severity", judgment("High"))
            .with_response("Input Plausibility", judgment("Low")),
        arbiter,
        PipelineOptions::default(),
    );

    assert_eq!(summary.metrics_finalized, 2);
    assert_eq!(arbiter_calls.load(Ordering::SeqCst), 1);

    let assessments = &store.get("smith2021fuzz").unwrap().assessments;
    assert_eq!(
        assessments["Failure Severity"].arbitrator.as_ref().unwrap().value,
        "High"
    );
    assert_eq!(
        assessments["Input Plausibility"].arbitrator.as_ref().unwrap().value,
        "Low"
    );
}

#[test]
fn second_run_is_idempotent_with_zero_backend_calls() {
    let fx = Fixture::new();
    let (_, _) = fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("Low"),
        MockArbiter::returning_value("Medium"),
        PipelineOptions::default(),
    );
    let first_bytes = std::fs::read(&fx.store_path).unwrap();

    let eval_a = MockEvaluator::new("a").with_default_value("High");
    let eval_b = MockEvaluator::new("b").with_default_value("Low");
    let arbiter = MockArbiter::returning_value("Medium");
    let (a_calls, b_calls, arb_calls) = (
        eval_a.call_counter(),
        eval_b.call_counter(),
        arbiter.call_counter(),
    );

    let (summary, _) = fx.run(eval_a, eval_b, arbiter, PipelineOptions::default());

    assert_eq!(summary.metrics_finalized, 0);
    assert_eq!(summary.skipped_finalized, 1);
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    assert_eq!(arb_calls.load(Ordering::SeqCst), 0);

    let second_bytes = std::fs::read(&fx.store_path).unwrap();
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn override_recomputes_and_plain_rerun_does_not() {
    let fx = Fixture::new();
    // First run finalizes at High (agreement).
    fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );

    // Evaluators have changed their minds; a plain rerun must not care.
    let (_, store) = fx.run(
        MockEvaluator::new("a").with_default_value("Low"),
        MockEvaluator::new("b").with_default_value("Low"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );
    assert_eq!(fx.arbitrator_value(&store), "High");

    // An override run with no-cache recomputes from the new outputs.
    let (summary, store) = fx.run(
        MockEvaluator::new("a").with_default_value("Low"),
        MockEvaluator::new("b").with_default_value("Low"),
        MockArbiter::returning_value("unused"),
        PipelineOptions {
            override_finalized: true,
            no_cache: true,
        },
    );
    assert_eq!(summary.metrics_finalized, 1);
    assert_eq!(fx.arbitrator_value(&store), "Low");
}

#[test]
fn manual_judgments_survive_every_run() {
    let fx = Fixture::new();
    fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );

    // Human reviewer sets the manual judgment out of band.
    {
        let mut store = fx.store();
        store
            .get_mut("smith2021fuzz")
            .unwrap()
            .assessments
            .get_mut("Failure Severity")
            .unwrap()
            .manual = Judgment::new("Medium", "reviewer", "sec 5");
        store.flush().unwrap();
    }

    // Plain rerun.
    let (_, store) = fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );
    assert_eq!(
        store.get("smith2021fuzz").unwrap().assessments["Failure Severity"]
            .manual
            .value,
        "Medium"
    );

    // Override + no-cache rerun.
    let (_, store) = fx.run(
        MockEvaluator::new("a").with_default_value("Low"),
        MockEvaluator::new("b").with_default_value("Low"),
        MockArbiter::returning_value("unused"),
        PipelineOptions {
            override_finalized: true,
            no_cache: true,
        },
    );
    let entry = &store.get("smith2021fuzz").unwrap().assessments["Failure Severity"];
    assert_eq!(entry.arbitrator.as_ref().unwrap().value, "Low");
    assert_eq!(entry.manual.value, "Medium");
}

#[test]
fn cache_alone_reconstructs_the_store_without_backend_calls() {
    let fx = Fixture::new();
    fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );

    // Lose the store document but keep the raw-response cache; reseed the
    // paper catalog (records only, no assessments).
    std::fs::remove_file(&fx.store_path).unwrap();
    Fixture::seed_store(&fx.store_path);

    let eval_a = MockEvaluator::new("a"); // no scripted responses: a call would error
    let eval_b = MockEvaluator::new("b");
    let arbiter = MockArbiter::returning_value("unused");
    let (a_calls, b_calls) = (eval_a.call_counter(), eval_b.call_counter());

    let (summary, store) = fx.run(eval_a, eval_b, arbiter, PipelineOptions::default());

    assert_eq!(summary.metrics_finalized, 1);
    assert_eq!(summary.backend_failures, 0);
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.arbitrator_value(&store), "High");
}

#[test]
fn unknown_paper_is_quarantined_and_store_untouched() {
    let fx = Fixture::new();
    std::fs::write(fx.papers_dir.join("stranger2024.pdf"), b"%PDF-1.4 stub").unwrap();

    let (summary, store) = fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );

    assert_eq!(summary.quarantined_papers, 1);
    assert!(!store.contains("stranger2024"));
    // The document was moved, not deleted.
    assert!(!fx.papers_dir.join("stranger2024.pdf").exists());
    assert!(fx.papers_dir.join("quarantine/stranger2024.pdf").exists());
    // The known paper still processed normally.
    assert_eq!(summary.metrics_finalized, 1);
}

#[test]
fn backend_failure_is_cached_but_never_promoted() {
    let fx = Fixture::new();
    let (summary, store) = fx.run(
        MockEvaluator::new("a"), // unscripted: every call errors
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );

    assert_eq!(summary.metrics_finalized, 0);
    assert_eq!(summary.backend_failures, 1);
    assert!(
        !store.get("smith2021fuzz").unwrap().assessments.contains_key("Failure Severity"),
        "failure markers must not reach the store"
    );

    let entry = fx.cache().get("smith2021", "Failure Severity", "a").unwrap();
    assert_eq!(entry.status, CacheStatus::BackendError);

    // The failed entry is not reused: a healthy rerun finalizes.
    let eval_a = MockEvaluator::new("a").with_default_value("High");
    let a_calls = eval_a.call_counter();
    let (summary, _) = fx.run(
        eval_a,
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );
    assert_eq!(summary.metrics_finalized, 1);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unparseable_response_is_demoted_and_retried_next_run() {
    let fx = Fixture::new();
    let (summary, store) = fx.run(
        MockEvaluator::new("a").with_default_raw("I cannot answer that."),
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );

    assert_eq!(summary.metrics_finalized, 0);
    assert_eq!(summary.skipped_unparseable, 1);
    assert!(store.get("smith2021fuzz").unwrap().assessments.is_empty());

    let entry = fx.cache().get("smith2021", "Failure Severity", "a").unwrap();
    assert_eq!(entry.status, CacheStatus::Unparseable);
    assert_eq!(entry.raw, "I cannot answer that.");

    // Next run re-invokes the backend rather than replaying the bad text.
    let eval_a = MockEvaluator::new("a").with_default_value("High");
    let a_calls = eval_a.call_counter();
    let (summary, _) = fx.run(
        eval_a,
        MockEvaluator::new("b").with_default_value("High"),
        MockArbiter::returning_value("unused"),
        PipelineOptions::default(),
    );
    assert_eq!(summary.metrics_finalized, 1);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unparseable_arbitration_skips_metric_but_not_the_run() {
    let fx = Fixture::new();
    let (summary, store) = fx.run(
        MockEvaluator::new("a").with_default_value("High"),
        MockEvaluator::new("b").with_default_value("Low"),
        MockArbiter::returning_raw("the committee is undecided"),
        PipelineOptions::default(),
    );

    assert_eq!(summary.metrics_finalized, 0);
    assert_eq!(summary.skipped_unparseable, 1);
    assert!(store.get("smith2021fuzz").unwrap().assessments.is_empty());

    // Evaluator responses stayed cached as ok; only arbitration is retried.
    let cache = fx.cache();
    assert_eq!(
        cache.get("smith2021", "Failure Severity", "a").unwrap().status,
        CacheStatus::Ok
    );
    assert_eq!(
        cache
            .get("smith2021", "Failure Severity", appraise_core::ARBITER_TAG)
            .unwrap()
            .status,
        CacheStatus::Unparseable
    );

    let arbiter = MockArbiter::returning_value("Medium");
    let arb_calls = arbiter.call_counter();
    let eval_a = MockEvaluator::new("a");
    let eval_b = MockEvaluator::new("b");
    let (a_calls, b_calls) = (eval_a.call_counter(), eval_b.call_counter());
    let (summary, store) = fx.run(eval_a, eval_b, arbiter, PipelineOptions::default());

    assert_eq!(summary.metrics_finalized, 1);
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    assert_eq!(arb_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.arbitrator_value(&store), "Medium");
}

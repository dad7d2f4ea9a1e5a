//! Testes de integração do ciclo feedback → patterns → prompt → treino.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use tempfile::TempDir;

use feedloop::knowledge::{KnowledgeStore, PatternFilter, PatternObservation, PatternType};
use feedloop::metrics::MetricsAggregator;
use feedloop::mining::PatternMiner;
use feedloop::prompt::PromptEnhancer;
use feedloop::training::{ExportRequest, TrainingExporter};
use feedloop::types::config::{
    Config, EnhancerConfig, ExportFormat, ExportPeriod, FrequencyPolicy, MinerConfig,
    RefresherConfig,
};
use feedloop::types::feedback::FeedbackEvent;

fn store() -> (TempDir, KnowledgeStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = KnowledgeStore::new(&dir.path().join("kb.db")).unwrap();
    (dir, store)
}

fn now() -> DateTime<Utc> {
    "2026-10-19T12:00:00Z".parse().unwrap()
}

fn rejection(id: i64, comment: &str, created_at: DateTime<Utc>) -> FeedbackEvent {
    serde_json::from_value(json!({
        "id": id,
        "outcome": "rejected",
        "doctor_comments": comment,
        "diagnostic_relevance": 3,
        "prescription_relevance": 2,
        "created_at": created_at,
    }))
    .unwrap()
}

fn completed(id: i64, created_at: DateTime<Utc>) -> FeedbackEvent {
    let recommendation = |diagnosis: &str, dosage: &str| {
        json!({
            "diagnosis": diagnosis,
            "justification": "clinique",
            "prescriptions": [{
                "drug_name": "Amoxicilline",
                "dosage": dosage,
                "frequency": "2x/jour",
                "duration": "6 jours",
                "route": "orale",
                "justification": "première intention"
            }]
        })
    };

    serde_json::from_value(json!({
        "id": id,
        "outcome": "modified",
        "modifications_made": "1 g remplacé par 500 mg",
        "efficacy": "very_effective",
        "healing_days": 4,
        "diagnostic_relevance": 9,
        "prescription_relevance": 8,
        "follow_up_complete": true,
        "created_at": created_at,
        "consultation": {
            "diagnosis": "Angine",
            "symptoms": "fièvre",
            "patient": { "patient_ref": "P-7", "birth_date": "1980-01-15", "sex": "F" },
            "ai_recommendation": recommendation("Angine", "1 g"),
            "final_recommendation": recommendation("Angine bactérienne", "500 mg"),
        },
    }))
    .unwrap()
}

#[test]
fn test_ten_days_of_rejections_become_an_error_to_avoid() {
    let (_dir, mut store) = store();
    let now = now();

    let events: Vec<FeedbackEvent> = (0..10)
        .map(|day| rejection(day, "dosage trop élevé", now - Duration::days(day) - Duration::hours(1)))
        .collect();
    store.ingest_feedback(&events).unwrap();

    let miner = PatternMiner::new(&MinerConfig::default()).unwrap();
    let report = miner.run_window(&mut store, now).unwrap();
    assert_eq!(report.events_analyzed, 7);

    let patterns = store.list_patterns(&PatternFilter::active()).unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern_type, PatternType::FrequentRejection);
    assert!(patterns[0].description.contains("élevé"));
    assert!(patterns[0].frequency >= 2);

    let enhancer = PromptEnhancer::new(&EnhancerConfig::default());
    let snapshot = store.enhancement_snapshot(now, 7).unwrap();
    let prompt = enhancer.enhance("BASE", &snapshot, None);

    assert!(prompt.starts_with("BASE\n\n"));
    let errors = prompt
        .split("FREQUENT ERRORS TO AVOID")
        .nth(1)
        .expect("errors section present");
    assert!(errors.contains("élevé"));
}

#[test]
fn test_mine_and_refresh_converge() {
    let (_dir, mut store) = store();
    let now = now();
    let events: Vec<FeedbackEvent> = (0..5)
        .map(|i| rejection(i, "hémorragie digestive", now - Duration::hours(i + 1)))
        .collect();

    let miner = PatternMiner::new(&MinerConfig::default()).unwrap();
    let refresher = RefresherConfig::default();

    let snapshot = |store: &KnowledgeStore| -> Vec<(i64, bool, f64)> {
        store
            .list_patterns(&PatternFilter::default())
            .unwrap()
            .into_iter()
            .map(|p| (p.id, p.is_active, p.confidence))
            .collect()
    };

    miner.run(&mut store, &events, now);
    store.refresh_confidence(&refresher, now).unwrap();
    let first = snapshot(&store);

    miner.run(&mut store, &events, now);
    store.refresh_confidence(&refresher, now).unwrap();
    let second = snapshot(&store);

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_upsert_keeps_one_row_and_latest_frequency() {
    let (_dir, mut store) = store();
    let now = now();
    let mut config = MinerConfig::default();
    config.frequency_policy = FrequencyPolicy::Replace;
    let miner = PatternMiner::new(&config).unwrap();

    let first: Vec<FeedbackEvent> = (0..5)
        .map(|i| rejection(i, "insuffisance rénale", now - Duration::hours(1)))
        .collect();
    let second: Vec<FeedbackEvent> = (10..13)
        .map(|i| rejection(i, "insuffisance rénale", now - Duration::days(2)))
        .collect();

    miner.run(&mut store, &first, now);
    // Lote mais antigo: a frequência segue o lote, last_seen não recua
    miner.run(&mut store, &second, now - Duration::days(1));

    let pattern = store
        .find_pattern(
            PatternType::FrequentRejection,
            "Frequent error causing rejection: insuffisance",
        )
        .unwrap()
        .expect("pattern mined");
    assert_eq!(pattern.frequency, 3);
    assert_eq!(pattern.last_seen, now);
    assert_eq!(
        store
            .list_patterns(&PatternFilter {
                active_only: false,
                pattern_type: Some(PatternType::FrequentRejection),
            })
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_metrics_for_empty_day() {
    let (_dir, mut store) = store();
    let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();

    let report = MetricsAggregator::run(&mut store, date, now()).unwrap();
    let metrics = report.metrics;
    assert_eq!(metrics.total_feedback, 0);
    assert_eq!(metrics.validation_rate, 0.0);
    assert_eq!(metrics.modification_rate, 0.0);
    assert_eq!(metrics.rejection_rate, 0.0);
    assert_eq!(metrics.high_efficacy_rate, 0.0);
    assert!(metrics.avg_diagnostic_score.is_none());
    assert!(metrics.avg_healing_days.is_none());
    assert!(store.daily_metrics(date).unwrap().is_some());
}

#[test]
fn test_samples_are_exported_once() {
    let (dir, mut store) = store();
    let now = now();
    let created_at = now - Duration::hours(3);
    store
        .ingest_feedback(&[completed(1, created_at), completed(2, created_at)])
        .unwrap();

    let aggregation = MetricsAggregator::run(&mut store, created_at.date_naive(), now).unwrap();
    assert_eq!(aggregation.samples.created, 2);

    let request = ExportRequest {
        min_score: 7,
        period: ExportPeriod::All,
        format: ExportFormat::ChatSystem,
        output: dir.path().join("out").join("train.jsonl"),
        system_persona: "Assistant médical".to_string(),
        include_consumed: false,
    };

    let first = TrainingExporter::export(&mut store, &request, now).unwrap();
    assert_eq!(first.count, 2);
    let written = std::fs::read_to_string(&request.output).unwrap();
    assert_eq!(written.lines().count(), 2);
    assert!(written.contains("Assistant médical"));

    let second = TrainingExporter::export(&mut store, &request, now).unwrap();
    assert_eq!(second.count, 0);
    assert!(second.output.is_none());
}

#[test]
fn test_low_confidence_patterns_leave_instruction_untouched() {
    let (_dir, mut store) = store();
    let now = now();
    let config = Config::default_config();

    for (i, description) in ["a", "b", "c"].iter().enumerate() {
        let observation = PatternObservation::new(
            PatternType::FrequentModification,
            format!("Frequent modification related to: {}", description),
            2 + i,
            (2 + i) * 5,
        );
        store
            .upsert_pattern(&observation, config.miner.frequency_policy, now)
            .unwrap();
    }

    let enhancer = PromptEnhancer::new(&config.enhancer);
    let snapshot = store
        .enhancement_snapshot(now, config.enhancer.stats_window_days)
        .unwrap();
    let base = enhancer.base_instruction();
    assert_eq!(enhancer.enhance(base, &snapshot, None), base);
}

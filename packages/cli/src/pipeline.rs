//! Pipeline orchestration.
//!
//! Stages run in a fixed order: boundary, ingest, geocode, boundary
//! filtering, denial breakdowns, proximity, comparisons, rankings, output. Each stage logs
//! its counts and hands owned data to the next.

use std::sync::Arc;
use std::time::Instant;

use safety_map_analytics::compare::compare_outcomes;
use safety_map_analytics::dedupe::rank_hotspots;
use safety_map_analytics::denials::denial_breakdown;
use safety_map_analytics::hotspots::street_hotspots;
use safety_map_analytics::proximity::annotate;
use safety_map_cli_utils::{IndicatifProgress, MultiProgress};
use safety_map_config::AnalysisConfig;
use safety_map_geocoder::cache::GeocodeCache;
use safety_map_geocoder::corpus::PairCorpus;
use safety_map_geocoder::progress::ProgressCallback;
use safety_map_geocoder::{GeocodeOutcome, IntersectionGeocoder, geocode_subjects};
use safety_map_ingest::IngestReport;
use safety_map_ingest::crash::load_crashes;
use safety_map_ingest::signal_study::load_signal_studies;
use safety_map_ingest::speed_reducer::load_speed_reducers;
use safety_map_safety_models::{
    AnnotatedSubject, IncidentRecord, Outcome, SegmentEndpoint, SubjectRecord,
};
use safety_map_spatial::boundary::load_or_fetch;
use safety_map_spatial::{BoundaryError, BoundaryIndex, filter_in_boundary};

use crate::output::{self, Summary};

/// Number of stages reported on the stage bar by [`run`].
const RUN_STAGES: u64 = 8;

/// Everything read from the feeds.
struct Inputs {
    subjects: Vec<SubjectRecord>,
    endpoints: Vec<SegmentEndpoint>,
    incidents: Vec<IncidentRecord>,
    reports: Vec<IngestReport>,
}

/// Loads the target-area boundary, downloading it if necessary.
///
/// # Errors
///
/// Returns [`BoundaryError`] if the boundary cannot be read or fetched.
pub async fn load_boundary(config: &AnalysisConfig) -> Result<BoundaryIndex, BoundaryError> {
    let selector = config.boundary.selector();
    load_or_fetch(
        &config.boundary_path(),
        config.boundary.url.as_deref(),
        selector.as_ref(),
    )
    .await
}

fn load_inputs(config: &AnalysisConfig) -> Result<Inputs, Box<dyn std::error::Error>> {
    let (mut subjects, studies_report) =
        load_signal_studies(&config.signal_studies_path(), &config.ingest)?;
    let (reducers, reducers_report) =
        load_speed_reducers(&config.speed_reducers_path(), &config.ingest)?;
    let (incidents, crashes_report) = load_crashes(&config.crashes_path())?;

    subjects.extend(reducers.subjects);
    Ok(Inputs {
        subjects,
        endpoints: reducers.endpoints,
        incidents,
        reports: vec![studies_report, reducers_report, crashes_report],
    })
}

/// Locates subjects without coordinates and persists the cache.
///
/// The reference corpora are built from every parsed crash and segment
/// endpoint, not only those inside the boundary, so streets crossing the
/// edge of the area still get well-fitted lines.
fn geocode(
    config: &AnalysisConfig,
    boundary: &BoundaryIndex,
    inputs: &mut Inputs,
    refresh_cache: bool,
    progress: &dyn ProgressCallback,
) -> Result<GeocodeOutcome, Box<dyn std::error::Error>> {
    let incident_corpus = PairCorpus::from_incidents(&inputs.incidents);
    let segment_corpus = PairCorpus::from_segment_endpoints(&inputs.endpoints);
    let geocoder = IntersectionGeocoder::new(incident_corpus, segment_corpus, boundary, config.geocoder);

    let cache_path = config.geocode_cache_path();
    let cache = if refresh_cache {
        log::info!("Ignoring geocode cache at {}", cache_path.display());
        GeocodeCache::empty()
    } else {
        GeocodeCache::load(&cache_path, boundary)?
    };

    let subjects = std::mem::take(&mut inputs.subjects);
    let outcome = geocode_subjects(subjects, &geocoder, &cache, progress);

    std::fs::create_dir_all(&config.output.directory)?;
    outcome.cache.save(&cache_path)?;
    log::info!(
        "Saved {} cached intersection(s) ({} located) to {}",
        outcome.cache.len(),
        outcome.cache.located(),
        cache_path.display()
    );

    Ok(outcome)
}

/// Ensures the boundary file is present.
///
/// # Errors
///
/// Returns an error if the boundary cannot be read or fetched.
pub async fn ensure_boundary(config: &AnalysisConfig) -> Result<(), Box<dyn std::error::Error>> {
    let boundary = load_boundary(config).await?;
    let bbox = boundary.bounding_box();
    log::info!(
        "Boundary ready: lat {:.5}..{:.5}, lon {:.5}..{:.5}",
        bbox.min_latitude,
        bbox.max_latitude,
        bbox.min_longitude,
        bbox.max_longitude
    );
    Ok(())
}

/// Geocodes subjects and refreshes the cache without running the
/// analysis.
///
/// # Errors
///
/// Returns an error if any input cannot be read or the cache cannot be
/// written.
pub async fn geocode_only(
    config: &AnalysisConfig,
    refresh_cache: bool,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let boundary = load_boundary(config).await?;
    let mut inputs = load_inputs(config)?;
    let bar = IndicatifProgress::batch_bar(multi, "Geocoding");
    let outcome = geocode(config, &boundary, &mut inputs, refresh_cache, bar.as_ref())?;

    let located = outcome.subjects.iter().filter(|s| s.point.is_some()).count();
    log::info!(
        "{located} of {} subject(s) located; {} cache hit(s)",
        outcome.subjects.len(),
        outcome.report.cache_hits
    );
    for id in &outcome.unmatched {
        log::debug!("Unlocated subject {id}");
    }
    Ok(())
}

/// Runs the full analysis and writes every table.
///
/// # Errors
///
/// Returns an error if any input cannot be read or any output cannot be
/// written.
pub async fn run(
    config: &AnalysisConfig,
    refresh_cache: bool,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let stages: Arc<dyn ProgressCallback> = IndicatifProgress::stages_bar(multi, "Analysis", RUN_STAGES);

    stages.set_message("Loading boundary".to_string());
    let boundary = load_boundary(config).await?;
    stages.inc(1);

    stages.set_message("Reading feeds".to_string());
    let mut inputs = load_inputs(config)?;
    stages.inc(1);

    stages.set_message("Geocoding".to_string());
    let geocode_bar = IndicatifProgress::batch_bar(multi, "Geocoding");
    let geocoded = geocode(config, &boundary, &mut inputs, refresh_cache, geocode_bar.as_ref())?;
    stages.inc(1);

    // Subjects with a location outside the area are dropped; unlocated
    // ones stay so they are reported as not computable.
    let split = filter_in_boundary(geocoded.subjects, &boundary);
    let subject_boundary = split.report();
    let mut subjects = split.retained;
    subjects.extend(split.missing_geometry);
    subjects.sort_by(|a, b| a.dataset.cmp(&b.dataset).then_with(|| a.id.cmp(&b.id)));

    let crashes = filter_in_boundary(std::mem::take(&mut inputs.incidents), &boundary);
    let incident_boundary = crashes.report();
    let crashes = crashes.retained;

    stages.set_message("Summarizing denials".to_string());
    let denials = denial_breakdown(&subjects, &config.time_window, &config.denials);
    stages.inc(1);

    stages.set_message("Counting nearby crashes".to_string());
    let (annotated, proximity_report) =
        annotate(subjects, &crashes, &config.proximity, &config.time_window);
    stages.inc(1);

    stages.set_message("Comparing outcomes".to_string());
    let comparisons = compare_outcomes(&annotated, &config.statistics);
    stages.inc(1);

    stages.set_message("Ranking hotspots".to_string());
    let denied: Vec<AnnotatedSubject> = annotated
        .iter()
        .filter(|a| a.subject.outcome == Outcome::Denied)
        .cloned()
        .collect();
    let (hotspots, dedupe_report) = rank_hotspots(
        &denied,
        config.dedupe_radius_m(),
        config.dedupe.rank_metric,
        config.dedupe.top_n,
    );
    let streets = street_hotspots(
        &crashes,
        &config.time_window,
        config.dedupe.rank_metric,
        config.dedupe.top_n,
    );
    stages.inc(1);

    stages.set_message("Writing tables".to_string());
    let dir = &config.output.directory;
    std::fs::create_dir_all(dir)?;
    output::write_locations(&dir.join(output::LOCATIONS_TABLE), &annotated)?;
    output::write_comparisons(&dir.join(output::COMPARISON_TABLE), &comparisons)?;
    output::write_hotspots(&dir.join(output::HOTSPOTS_TABLE), &hotspots)?;
    output::write_street_hotspots(&dir.join(output::STREETS_TABLE), &streets)?;
    output::write_denial_tables(dir, &denials)?;
    output::write_summary(
        &dir.join(output::SUMMARY_FILE),
        &Summary {
            generated_at: chrono::Utc::now().to_rfc3339(),
            config,
            ingest: &inputs.reports,
            subject_boundary,
            incident_boundary,
            geocode: geocoded.report,
            unlocated_subjects: &geocoded.unmatched,
            proximity: proximity_report,
            dedupe: dedupe_report,
            comparisons: &comparisons,
            denials: &denials,
        },
    )?;
    stages.inc(1);

    stages.finish(format!(
        "Analysis complete in {:.1}s",
        start.elapsed().as_secs_f64()
    ));
    Ok(())
}

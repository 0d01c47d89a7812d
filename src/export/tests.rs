use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeZone};

use super::correlate::correlate;
use super::driver::ChunkDriver;
use super::record::{extract_heart_rate, extract_steps};
use super::scan::{attr, attr_f64, enclosing_tag_start, find_nearest};
use super::workout::extract_workout;
use super::*;

const WORKOUT_XML: &str = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" totalDistance="3.1" totalDistanceUnit="mi" totalEnergyBurned="250" totalEnergyBurnedUnit="kcal" sourceName="Watch" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 07:30:00 -0500">
  <MetadataEntry key="HKIndoorWorkout" value="0"/>
  <WorkoutEvent type="HKWorkoutEventTypePause" date="2023-05-01 07:10:00 -0500"/>
  <WorkoutStatistics type="HKQuantityTypeIdentifierHeartRate" average="150" minimum="120" maximum="175"/>
</Workout>"#;

const SECOND_WORKOUT_XML: &str = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="20" durationUnit="min" totalDistance="2.0" totalDistanceUnit="mi" startDate="2023-05-02 07:00:00 -0500" endDate="2023-05-02 07:20:00 -0500"></Workout>"#;

const HR_RECORD_XML: &str = r#"<Record type="HKQuantityTypeIdentifierHeartRate" sourceName="Watch" unit="count/min" value="142" startDate="2023-05-01 07:05:00 -0500" endDate="2023-05-01 07:05:00 -0500"/>"#;

const STEP_RECORD_XML: &str = r#"<Record type="HKQuantityTypeIdentifierStepCount" sourceName="Phone" unit="count" value="540" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 07:06:00 -0500"/>"#;

fn default_markers() -> Vec<String> {
    vec![RUNNING_WORKOUT_MARKER.to_string()]
}

fn run_driver(input: &str, chunk_size: usize, mode: ParseMode) -> Harvest {
    let markers = default_markers();
    let mut driver = ChunkDriver::new(mode, &markers);
    let mut out = Harvest::default();
    for chunk in input.as_bytes().chunks(chunk_size) {
        driver.push_chunk(chunk, &mut out);
    }
    driver.finish(&mut out);
    out
}

/// Instant at `secs` seconds past an arbitrary UTC epoch point
fn dt(secs: i64) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .timestamp_opt(1_680_000_000 + secs, 0)
        .unwrap()
}

fn bare_workout(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> WorkoutRecord {
    WorkoutRecord {
        start,
        end,
        duration_min: (end - start).num_seconds() as f64 / 60.0,
        distance_mi: 0.0,
        energy_kcal: 0.0,
        source: None,
        indoor: false,
        stats: WorkoutStats::default(),
        events: Vec::new(),
        hr_samples: Vec::new(),
        cadence_spm: None,
        pace_min_per_mi: None,
    }
}

mod scanning {
    use super::*;

    #[test]
    fn nearest_marker_wins() {
        let buf = format!("junk {STEP_COUNT_MARKER} more {HEART_RATE_MARKER} tail");
        let markers = [HEART_RATE_MARKER, STEP_COUNT_MARKER];
        let (at, idx) = find_nearest(&buf, 0, &markers).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(at, 5);
    }

    #[test]
    fn tie_breaks_by_marker_order() {
        let markers = ["abc", "abcdef"];
        let (at, idx) = find_nearest("xxabcdef", 0, &markers).unwrap();
        assert_eq!((at, idx), (2, 0));
    }

    #[test]
    fn search_respects_start_offset() {
        let buf = "abc abc";
        assert_eq!(find_nearest(buf, 1, &["abc"]), Some((4, 0)));
        assert_eq!(find_nearest(buf, 5, &["abc"]), None);
    }

    #[test]
    fn enclosing_tag_start_scans_backward() {
        let buf = r#"<Record type="x""#;
        assert_eq!(enclosing_tag_start(buf, 8), Some(0));
    }

    #[test]
    fn missing_tag_start_is_reported() {
        // Marker visible but its '<' lies before the buffer window.
        let buf = r#"type="x" value="1"/>"#;
        assert_eq!(enclosing_tag_start(buf, 0), None);
    }

    #[test]
    fn attribute_extraction() {
        let tag = r#"<Workout duration="30" sourceName="My Watch""#;
        assert_eq!(attr(tag, "duration"), Some("30"));
        assert_eq!(attr(tag, "sourceName"), Some("My Watch"));
        assert_eq!(attr(tag, "missing"), None);
    }

    #[test]
    fn numeric_attribute_failures_are_absence() {
        let tag = r#"<Workout duration="thirty" distance="3.5""#;
        assert_eq!(attr_f64(tag, "duration"), None);
        assert_eq!(attr_f64(tag, "distance"), Some(3.5));
        assert_eq!(attr_f64(tag, "missing"), None);
    }
}

mod dates {
    use super::*;

    #[test]
    fn health_format_parses_with_offset() {
        let parsed = parse_health_date("2023-05-01 07:00:00 -0500").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-05-01T07:00:00-05:00");
    }

    #[test]
    fn rfc3339_fallback() {
        assert!(parse_health_date("2023-05-01T07:00:00+02:00").is_some());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_health_date("").is_none());
        assert!(parse_health_date("yesterday").is_none());
        assert!(parse_health_date("2023-13-99 99:99:99 -0500").is_none());
    }
}

mod records {
    use super::*;

    #[test]
    fn heart_rate_extraction() {
        let sample = extract_heart_rate(HR_RECORD_XML).unwrap();
        assert_eq!(sample.bpm, 142.0);
        assert_eq!(sample.timestamp.to_rfc3339(), "2023-05-01T07:05:00-05:00");
    }

    #[test]
    fn heart_rate_requires_value_and_start() {
        let no_value = r#"<Record type="HKQuantityTypeIdentifierHeartRate" startDate="2023-05-01 07:05:00 -0500"/>"#;
        assert!(extract_heart_rate(no_value).is_none());
        let bad_date = r#"<Record type="HKQuantityTypeIdentifierHeartRate" value="142" startDate="nope"/>"#;
        assert!(extract_heart_rate(bad_date).is_none());
    }

    #[test]
    fn step_extraction_requires_all_three_fields() {
        let sample = extract_steps(STEP_RECORD_XML).unwrap();
        assert_eq!(sample.count, 540.0);
        assert!(sample.end > sample.start);

        let no_end = r#"<Record type="HKQuantityTypeIdentifierStepCount" value="540" startDate="2023-05-01 07:00:00 -0500"/>"#;
        assert!(extract_steps(no_end).is_none());
    }
}

mod workouts {
    use super::*;

    #[test]
    fn basic_extraction() {
        let workout = extract_workout(WORKOUT_XML).unwrap();
        assert_eq!(workout.duration_min, 30.0);
        assert_eq!(workout.distance_mi, 3.1);
        assert_eq!(workout.energy_kcal, 250.0);
        assert_eq!(workout.source.as_deref(), Some("Watch"));
        assert!(!workout.indoor);
        assert_eq!(workout.stats.avg_hr, Some(150.0));
        assert_eq!(workout.stats.min_hr, Some(120.0));
        assert_eq!(workout.stats.max_hr, Some(175.0));
        assert_eq!(workout.events.len(), 1);
        assert_eq!(workout.events[0].kind, "HKWorkoutEventTypePause");
        let pace = workout.pace_min_per_mi.unwrap();
        assert!((pace - 30.0 / 3.1).abs() < 1e-9);
    }

    #[test]
    fn duration_is_always_minutes() {
        let seconds = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="3600" durationUnit="s" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 08:00:00 -0500"></Workout>"#;
        assert_eq!(extract_workout(seconds).unwrap().duration_min, 60.0);

        let hours = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="1.5" durationUnit="hr" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 08:30:00 -0500"></Workout>"#;
        assert_eq!(extract_workout(hours).unwrap().duration_min, 90.0);
    }

    #[test]
    fn distance_is_always_miles() {
        let km = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="60" durationUnit="min" totalDistance="10" totalDistanceUnit="km" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 08:00:00 -0500"></Workout>"#;
        let workout = extract_workout(km).unwrap();
        assert!((workout.distance_mi - 6.21371).abs() < 1e-3);

        let meters = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="60" durationUnit="min" totalDistance="1609.34" totalDistanceUnit="M" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 08:00:00 -0500"></Workout>"#;
        let workout = extract_workout(meters).unwrap();
        assert!((workout.distance_mi - 1.0).abs() < 1e-3);
    }

    #[test]
    fn energy_kj_converts_to_kcal() {
        let kj = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" totalEnergyBurned="418.4" totalEnergyBurnedUnit="kJ" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 07:30:00 -0500"></Workout>"#;
        let workout = extract_workout(kj).unwrap();
        assert!((workout.energy_kcal - 100.0).abs() < 1e-9);
    }

    #[test]
    fn statistics_fill_missing_distance_and_energy() {
        let xml = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" totalDistance="0" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 07:30:00 -0500">
  <WorkoutStatistics type="HKQuantityTypeIdentifierDistanceWalkingRunning" sum="5" unit="km"/>
  <WorkoutStatistics type="HKQuantityTypeIdentifierActiveEnergyBurned" quantity="300" unit="kcal"/>
</Workout>"#;
        let workout = extract_workout(xml).unwrap();
        assert!((workout.distance_mi - 5.0 * 0.621371).abs() < 1e-6);
        assert_eq!(workout.energy_kcal, 300.0);
    }

    #[test]
    fn statistics_accept_alternate_attribute_names() {
        let xml = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 07:30:00 -0500">
  <WorkoutStatistics type="HKQuantityTypeIdentifierHeartRate" avg="148" min="110" max="181"/>
  <WorkoutStatistics type="HKQuantityTypeIdentifierRunningSpeed" average="6.2" maximum="9.1"/>
</Workout>"#;
        let workout = extract_workout(xml).unwrap();
        assert_eq!(workout.stats.avg_hr, Some(148.0));
        assert_eq!(workout.stats.min_hr, Some(110.0));
        assert_eq!(workout.stats.max_hr, Some(181.0));
        assert_eq!(workout.stats.avg_speed, Some(6.2));
        assert_eq!(workout.stats.max_speed, Some(9.1));
    }

    #[test]
    fn indoor_flag_via_metadata() {
        let xml = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" startDate="2023-05-01 07:00:00 -0500" endDate="2023-05-01 07:30:00 -0500">
  <MetadataEntry key="HKIndoorWorkout" value="1"/>
</Workout>"#;
        assert!(extract_workout(xml).unwrap().indoor);
        assert!(!extract_workout(WORKOUT_XML).unwrap().indoor);
    }

    #[test]
    fn unparseable_start_date_drops_the_workout() {
        let xml = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" totalDistance="3.1" totalDistanceUnit="mi" startDate="not a date" endDate="2023-05-01 07:30:00 -0500"></Workout>"#;
        assert!(extract_workout(xml).is_none());
    }

    #[test]
    fn repeated_extraction_is_stable() {
        let first = extract_workout(WORKOUT_XML).unwrap();
        let second = extract_workout(WORKOUT_XML).unwrap();
        assert_eq!(first, second);
    }
}

mod driving {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_chunk_and_byte_chunks_agree() {
        let input = format!("{HR_RECORD_XML}\n{WORKOUT_XML}\n{STEP_RECORD_XML}\n");
        let whole = run_driver(&input, input.len(), ParseMode::Detailed);
        let bytes = run_driver(&input, 1, ParseMode::Detailed);
        assert_eq!(whole.workouts, bytes.workouts);
        assert_eq!(whole.hr_samples, bytes.hr_samples);
        assert_eq!(whole.step_samples, bytes.step_samples);
        assert_eq!(whole.workouts.len(), 1);
        assert_eq!(whole.hr_samples.len(), 1);
        assert_eq!(whole.step_samples.len(), 1);
    }

    proptest! {
        #[test]
        fn chunk_size_never_changes_output(chunk_size in 1usize..300) {
            let input = format!("{HR_RECORD_XML}\n{WORKOUT_XML}\n{STEP_RECORD_XML}\n{SECOND_WORKOUT_XML}\n");
            let whole = run_driver(&input, input.len(), ParseMode::Detailed);
            let split = run_driver(&input, chunk_size, ParseMode::Detailed);
            prop_assert_eq!(&whole.workouts, &split.workouts);
            prop_assert_eq!(&whole.hr_samples, &split.hr_samples);
            prop_assert_eq!(&whole.step_samples, &split.step_samples);
        }
    }

    #[test]
    fn adjacent_workouts_split_at_their_boundary() {
        let markers = default_markers();
        let mut driver = ChunkDriver::new(ParseMode::Fast, &markers);
        let mut out = Harvest::default();
        driver.push_chunk(WORKOUT_XML.as_bytes(), &mut out);
        driver.push_chunk(SECOND_WORKOUT_XML.as_bytes(), &mut out);
        driver.finish(&mut out);
        assert_eq!(out.workouts.len(), 2);
        assert_ne!(out.workouts[0].start, out.workouts[1].start);
    }

    #[test]
    fn workout_straddling_many_chunks() {
        let harvest = run_driver(WORKOUT_XML, 7, ParseMode::Detailed);
        assert_eq!(harvest.workouts.len(), 1);
        assert_eq!(harvest.workouts[0].events.len(), 1);
    }

    #[test]
    fn record_straddling_a_chunk_boundary() {
        let markers = default_markers();
        let mut driver = ChunkDriver::new(ParseMode::Detailed, &markers);
        let mut out = Harvest::default();
        let (head, tail) = HR_RECORD_XML.split_at(HR_RECORD_XML.len() / 2);
        driver.push_chunk(head.as_bytes(), &mut out);
        assert!(out.hr_samples.is_empty());
        driver.push_chunk(tail.as_bytes(), &mut out);
        driver.finish(&mut out);
        assert_eq!(out.hr_samples.len(), 1);
    }

    #[test]
    fn fast_mode_ignores_record_markers() {
        let input = format!("{HR_RECORD_XML}\n{STEP_RECORD_XML}\n{WORKOUT_XML}\n");
        let harvest = run_driver(&input, 64, ParseMode::Fast);
        assert_eq!(harvest.workouts.len(), 1);
        assert!(harvest.hr_samples.is_empty());
        assert!(harvest.step_samples.is_empty());
    }

    #[test]
    fn truncated_trailing_workout_is_best_effort() {
        // Cut the input before the close tag ever arrives.
        let truncated = &WORKOUT_XML[..WORKOUT_XML.len() - "</Workout>".len()];
        let harvest = run_driver(truncated, 16, ParseMode::Fast);
        assert_eq!(harvest.workouts.len(), 1);
        assert_eq!(harvest.workouts[0].distance_mi, 3.1);
    }

    #[test]
    fn workout_with_bad_dates_contributes_nothing() {
        let xml = r#"<Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" startDate="???" endDate="???"></Workout>"#;
        let harvest = run_driver(xml, 16, ParseMode::Detailed);
        assert!(harvest.workouts.is_empty());
    }

    #[test]
    fn non_running_workouts_are_skipped_by_default() {
        let cycling = WORKOUT_XML.replace("HKWorkoutActivityTypeRunning", "HKWorkoutActivityTypeCycling");
        let harvest = run_driver(&cycling, 64, ParseMode::Fast);
        assert!(harvest.workouts.is_empty());
    }

    #[test]
    fn configurable_marker_set_extends_coverage() {
        let cycling = WORKOUT_XML.replace("HKWorkoutActivityTypeRunning", "HKWorkoutActivityTypeCycling");
        let markers = vec![r#"workoutActivityType="HKWorkoutActivityTypeCycling""#.to_string()];
        let mut driver = ChunkDriver::new(ParseMode::Fast, &markers);
        let mut out = Harvest::default();
        driver.push_chunk(cycling.as_bytes(), &mut out);
        driver.finish(&mut out);
        assert_eq!(out.workouts.len(), 1);
    }

    #[test]
    fn multibyte_text_split_across_chunks_survives() {
        let input = format!("<Record sourceName=\"éàü\"/> {WORKOUT_XML}");
        let whole = run_driver(&input, input.len(), ParseMode::Detailed);
        let bytes = run_driver(&input, 1, ParseMode::Detailed);
        assert_eq!(whole.workouts, bytes.workouts);
    }
}

mod correlation {
    use super::*;

    fn hr(at: i64, bpm: f64) -> HeartRateSample {
        HeartRateSample {
            timestamp: dt(at),
            bpm,
        }
    }

    #[test]
    fn window_slicing_is_boundary_inclusive() {
        let samples = vec![hr(100, 110.0), hr(200, 120.0), hr(300, 130.0), hr(400, 140.0)];
        let workouts = vec![bare_workout(dt(150), dt(350))];
        let out = correlate(workouts, samples, Vec::new(), ParseMode::Detailed);
        let attached: Vec<i64> = out[0]
            .hr_samples
            .iter()
            .map(|s| (s.timestamp - dt(0)).num_seconds())
            .collect();
        assert_eq!(attached, vec![200, 300]);
    }

    #[test]
    fn samples_exactly_on_boundaries_attach() {
        let samples = vec![hr(150, 100.0), hr(350, 160.0)];
        let workouts = vec![bare_workout(dt(150), dt(350))];
        let out = correlate(workouts, samples, Vec::new(), ParseMode::Detailed);
        assert_eq!(out[0].hr_samples.len(), 2);
    }

    #[test]
    fn derived_hr_stats_fill_gaps_only() {
        let samples = vec![hr(160, 100.0), hr(200, 150.0), hr(240, 200.0)];
        let mut workout = bare_workout(dt(150), dt(350));
        workout.stats.avg_hr = Some(123.0);
        let out = correlate(vec![workout], samples, Vec::new(), ParseMode::Detailed);
        // Extracted average wins; min/max were absent so they derive.
        assert_eq!(out[0].stats.avg_hr, Some(123.0));
        assert_eq!(out[0].stats.min_hr, Some(100.0));
        assert_eq!(out[0].stats.max_hr, Some(200.0));
    }

    #[test]
    fn partially_overlapping_steps_are_apportioned() {
        let steps = vec![StepSample {
            start: dt(0),
            end: dt(100),
            count: 100.0,
        }];
        let mut workout = bare_workout(dt(50), dt(100));
        workout.duration_min = 1.0;
        let out = correlate(vec![workout], Vec::new(), steps, ParseMode::Detailed);
        // 50 of 100 steps fall inside the window; over one minute that is
        // a cadence of 50.
        assert_eq!(out[0].cadence_spm, Some(50));
    }

    #[test]
    fn cadence_from_fully_contained_buckets() {
        let steps = vec![
            StepSample {
                start: dt(0),
                end: dt(300),
                count: 900.0,
            },
            StepSample {
                start: dt(300),
                end: dt(600),
                count: 900.0,
            },
        ];
        let workout = bare_workout(dt(0), dt(600));
        let out = correlate(vec![workout], Vec::new(), steps, ParseMode::Detailed);
        assert_eq!(out[0].cadence_spm, Some(180));
    }

    #[test]
    fn fast_mode_attaches_nothing() {
        let samples = vec![hr(200, 120.0)];
        let workouts = vec![bare_workout(dt(150), dt(350))];
        let out = correlate(workouts, samples, Vec::new(), ParseMode::Fast);
        assert!(out[0].hr_samples.is_empty());
        assert!(out[0].stats.avg_hr.is_none());
    }

    #[test]
    fn output_is_chronologically_sorted() {
        let workouts = vec![bare_workout(dt(500), dt(600)), bare_workout(dt(0), dt(100))];
        let out = correlate(workouts, Vec::new(), Vec::new(), ParseMode::Detailed);
        assert!(out[0].start < out[1].start);
    }
}

mod sessions {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_over_memory_source_with_progress() {
        let input = format!("{HR_RECORD_XML}\n{WORKOUT_XML}\n");
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = ParserConfig {
            chunk_size: 64,
            ..ParserConfig::default()
        };
        let parser = ExportParser::new(config).with_progress(tx);
        let mut source: &[u8] = input.as_bytes();
        let workouts = parser.parse(&mut source).unwrap();
        drop(parser);

        assert_eq!(workouts.len(), 1);
        // The in-window HR sample attaches during correlation.
        assert_eq!(workouts[0].hr_samples.len(), 1);

        let updates: Vec<Progress> = rx.iter().collect();
        assert!(!updates.is_empty());
        let last = updates.last().unwrap();
        assert!((last.fraction_complete - 1.0).abs() < 1e-9);
        assert_eq!(last.counts.workouts, 1);
        assert_eq!(last.counts.hr_records, 1);
    }

    #[test]
    fn parse_file_round_trip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "{WORKOUT_XML}").unwrap();

        let parser = ExportParser::new(ParserConfig::fast());
        let workouts = parser.parse_file(tmp.path()).unwrap();
        assert_eq!(workouts.len(), 1);
        assert_eq!(workouts[0].duration_min, 30.0);
    }

    #[test]
    fn cancellation_between_chunks() {
        let flag = Arc::new(AtomicBool::new(true));
        let parser = ExportParser::new(ParserConfig::default()).with_cancel(flag);
        let mut source: &[u8] = WORKOUT_XML.as_bytes();
        assert!(matches!(
            parser.parse(&mut source),
            Err(ExportError::Cancelled)
        ));
    }

    #[test]
    fn spawned_parse_ends_with_one_terminal_event() {
        let source: &'static [u8] = WORKOUT_XML.as_bytes();
        let mut terminals = 0;
        let mut finished = None;
        for event in spawn_parse(ParserConfig::default(), source) {
            match event {
                ParseEvent::Progress(_) => {}
                ParseEvent::Finished(workouts) => {
                    terminals += 1;
                    finished = Some(workouts);
                }
                ParseEvent::Failed(message) => panic!("unexpected failure: {message}"),
            }
        }
        assert_eq!(terminals, 1);
        assert_eq!(finished.unwrap().len(), 1);
    }

    #[test]
    fn records_serialize_with_zone_explicit_instants() {
        let workouts = run_driver(WORKOUT_XML, WORKOUT_XML.len(), ParseMode::Fast).workouts;
        let json = serde_json::to_string(&workouts).unwrap();
        assert!(json.contains("2023-05-01T07:00:00-05:00"));
    }
}

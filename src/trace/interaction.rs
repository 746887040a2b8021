use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::trace::{EventPhase, TimeWindow, Trace, TraceEvent};

/// A user interaction recorded by an `EventTiming` trace event.
///
/// `ts` is the absolute trace timestamp in microseconds; every other time is
/// a millisecond offset from navigation start.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub ts: i64,
    pub time_stamp: f64,
    pub processing_start: f64,
    pub processing_end: f64,
    pub duration: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub interaction_id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTimingData {
    time_stamp: f64,
    processing_start: f64,
    processing_end: f64,
    duration: f64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    interaction_id: u64,
}

impl InteractionEvent {
    /// Reads the `args.data` payload of an `EventTiming` event.
    pub fn from_trace_event(event: &TraceEvent) -> Result<Self, TraceError> {
        let data = event.data().cloned().unwrap_or_default();
        let data: EventTimingData = serde_json::from_value(data)
            .map_err(|source| TraceError::Interaction { ts: event.ts, source })?;

        Ok(Self {
            ts: event.ts,
            time_stamp: data.time_stamp,
            processing_start: data.processing_start,
            processing_end: data.processing_end,
            duration: data.duration,
            kind: data.kind,
            interaction_id: data.interaction_id,
        })
    }
}

/// Finds the interaction with the longest duration. Among equally long
/// interactions the later one wins.
///
/// Only the begin events of `EventTiming` carry data; events without an
/// interaction id are not user interactions and are skipped.
pub fn select_interaction(trace: &Trace) -> Result<Option<InteractionEvent>, TraceError> {
    let mut selected: Option<InteractionEvent> = None;

    let timings = trace
        .events()
        .iter()
        .filter(|event| event.name == "EventTiming" && event.ph == EventPhase::AsyncBegin);

    for event in timings {
        let interaction = InteractionEvent::from_trace_event(event)?;
        if interaction.interaction_id == 0 {
            continue;
        }

        if selected
            .as_ref()
            .is_none_or(|current| interaction.duration >= current.duration)
        {
            selected = Some(interaction);
        }
    }

    Ok(selected)
}

/// The three consecutive parts of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionPhase {
    InputDelay,
    ProcessingDelay,
    PresentationDelay,
}

/// Windows of the three phases of an interaction, in trace microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimes {
    pub input_delay: TimeWindow,
    pub processing_delay: TimeWindow,
    pub presentation_delay: TimeWindow,
}

impl PhaseTimes {
    pub fn windows(&self) -> [(InteractionPhase, TimeWindow); 3] {
        [
            (InteractionPhase::InputDelay, self.input_delay),
            (InteractionPhase::ProcessingDelay, self.processing_delay),
            (InteractionPhase::PresentationDelay, self.presentation_delay),
        ]
    }
}

/// Splits an interaction into input delay, processing delay and presentation
/// delay. The windows are contiguous and together span the whole interaction.
pub fn get_phase_times(interaction: &InteractionEvent) -> PhaseTimes {
    let ts = interaction.ts as f64;
    let nav_start = ts - interaction.time_stamp * 1000.0;
    let processing_start = nav_start + interaction.processing_start * 1000.0;
    let processing_end = nav_start + interaction.processing_end * 1000.0;
    let end = ts + interaction.duration * 1000.0;

    PhaseTimes {
        input_delay: TimeWindow::new(ts, processing_start),
        processing_delay: TimeWindow::new(processing_start, processing_end),
        presentation_delay: TimeWindow::new(processing_end, end),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::*;

    fn timing(ts: i64, data: Value) -> Value {
        json!({"pid": 1, "tid": 1, "ts": ts, "ph": "b", "cat": "devtools.timeline", "name": "EventTiming", "args": {"data": data}})
    }

    fn data(time_stamp: f64, duration: f64, interaction_id: u64) -> Value {
        json!({
            "timeStamp": time_stamp,
            "processingStart": time_stamp + 5.0,
            "processingEnd": time_stamp + 46.0,
            "duration": duration,
            "type": "pointerdown",
            "interactionId": interaction_id
        })
    }

    #[test]
    fn test_phase_times() {
        const T: i64 = 5_000_000;

        let interaction = InteractionEvent {
            ts: T,
            time_stamp: 0.0,
            processing_start: 5.0,
            processing_end: 46.0,
            duration: 368.0,
            kind: "click".into(),
            interaction_id: 1,
        };

        let t = T as f64;
        let times = get_phase_times(&interaction);

        assert_eq!(times.input_delay, TimeWindow::new(t, t + 5_000.0));
        assert_eq!(times.processing_delay, TimeWindow::new(t + 5_000.0, t + 46_000.0));
        assert_eq!(times.presentation_delay, TimeWindow::new(t + 46_000.0, t + 368_000.0));

        let total: f64 = times.windows().iter().map(|(_, w)| w.length()).sum();
        assert_eq!(total, 368_000.0);
    }

    #[test]
    fn test_phase_times_with_navigation_offset() {
        let interaction = InteractionEvent {
            ts: 3_250_000,
            time_stamp: 1_250.0,
            processing_start: 1_262.0,
            processing_end: 1_300.0,
            duration: 112.0,
            kind: "keydown".into(),
            interaction_id: 7,
        };

        let times = get_phase_times(&interaction);
        let windows = times.windows();

        assert_eq!(windows[0].1.start_ts, 3_250_000.0);
        assert_eq!(windows[0].1.end_ts, 3_262_000.0);
        assert_eq!(windows[1].1.end_ts, 3_300_000.0);
        assert_eq!(windows[2].1.end_ts, 3_362_000.0);

        for pair in windows.windows(2) {
            assert_eq!(pair[0].1.end_ts, pair[1].1.start_ts);
        }
    }

    #[test]
    fn test_select_longest_interaction() {
        let trace = Trace::from_json(
            &json!([
                timing(1_000, data(1.0, 40.0, 1)),
                timing(2_000, data(2.0, 200.0, 0)),
                timing(3_000, data(3.0, 120.0, 2)),
                timing(4_000, data(4.0, 120.0, 3)),
                timing(5_000, data(5.0, 80.0, 4))
            ])
            .to_string(),
        )
        .unwrap();

        let selected = select_interaction(&trace).unwrap().unwrap();
        assert_eq!(selected.interaction_id, 3);
        assert_eq!(selected.ts, 4_000);
        assert_eq!(selected.kind, "pointerdown");
    }

    #[test]
    fn test_no_interaction() {
        let trace = Trace::from_json(&json!([timing(1_000, data(1.0, 40.0, 0))]).to_string()).unwrap();
        assert!(select_interaction(&trace).unwrap().is_none());
    }

    #[test]
    fn test_malformed_interaction() {
        let trace = Trace::from_json(&json!([timing(1_000, json!({"type": "click"}))]).to_string()).unwrap();

        assert!(matches!(
            select_interaction(&trace),
            Err(TraceError::Interaction { ts: 1_000, .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_phase_windows_cover_duration(
            ts in 0i64..1_000_000_000_000,
            time_stamp in 0u32..10_000_000,
            processing_start in 0u32..200_000,
            processing in 0u32..200_000,
            duration in 0u32..400_000,
        ) {
            let time_stamp = f64::from(time_stamp) / 8.0;
            let processing_start = time_stamp + f64::from(processing_start) / 8.0;
            let interaction = InteractionEvent {
                ts,
                time_stamp,
                processing_start,
                processing_end: processing_start + f64::from(processing) / 8.0,
                duration: f64::from(duration) / 8.0,
                kind: "click".into(),
                interaction_id: 1,
            };

            let phases = get_phase_times(&interaction);

            prop_assert_eq!(phases.input_delay.start_ts, ts as f64);
            prop_assert_eq!(phases.input_delay.end_ts, phases.processing_delay.start_ts);
            prop_assert_eq!(phases.processing_delay.end_ts, phases.presentation_delay.start_ts);

            let total: f64 = phases.windows().iter().map(|(_, window)| window.length()).sum();
            prop_assert!((total - interaction.duration * 1000.0).abs() < 1e-3);
        }
    }
}

use proptest::prelude::*;
use spike_binner::{BinEdges, EdgeSpacing, RecordingWindow};

fn window_and_bin_size() -> impl Strategy<Value = (RecordingWindow, u32)> {
    (1u32..5_000_000, 1u32..2_000, 0u32..10_000).prop_map(|(start, bin_size, extra)| {
        // At least one whole bin
        let span = bin_size + extra;
        let window = RecordingWindow {
            start_ms: f64::from(start),
            stop_ms: f64::from(start) + f64::from(span),
        };
        (window, bin_size)
    })
}

proptest! {
    #[test]
    fn linear_edges_span_window((window, bin_size) in window_and_bin_size()) {
        let edges = BinEdges::for_window(&window, bin_size, EdgeSpacing::Linear).unwrap();
        let expected_bins = (window.span_ms() / f64::from(bin_size)).floor() as usize;

        prop_assert_eq!(edges.as_slice().len(), expected_bins + 1);
        prop_assert_eq!(edges.first(), window.start_ms);
        prop_assert_eq!(edges.last(), window.stop_ms);
        prop_assert!(edges.as_slice().windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn exact_edges_never_pass_stop((window, bin_size) in window_and_bin_size()) {
        let edges = BinEdges::for_window(&window, bin_size, EdgeSpacing::Exact).unwrap();
        prop_assert_eq!(edges.first(), window.start_ms);
        prop_assert!(edges.last() <= window.stop_ms);
        prop_assert!(window.stop_ms - edges.last() < f64::from(bin_size));
        prop_assert!(edges.as_slice().windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn counts_never_exceed_inputs(
        (window, bin_size) in window_and_bin_size(),
        offsets in prop::collection::vec(-0.5f64..1.5, 0..200),
    ) {
        let edges = BinEdges::for_window(&window, bin_size, EdgeSpacing::Linear).unwrap();
        let values: Vec<f64> = offsets
            .iter()
            .map(|offset| window.start_ms + offset * window.span_ms())
            .collect();
        let inside = values
            .iter()
            .filter(|v| **v >= edges.first() && **v <= edges.last())
            .count();

        let hist = edges.histogram(values.iter());
        prop_assert_eq!(hist.counts.len(), edges.num_bins());
        prop_assert!(hist.total() as usize <= values.len());
        prop_assert_eq!(hist.total() as usize, inside);
        prop_assert_eq!(hist.excluded, values.len() - inside);

        // Same inputs, same counts
        prop_assert_eq!(edges.histogram(values.iter()), hist);
    }

    #[test]
    fn stop_lands_in_last_bin((window, bin_size) in window_and_bin_size()) {
        let edges = BinEdges::for_window(&window, bin_size, EdgeSpacing::Linear).unwrap();
        let hist = edges.histogram([window.stop_ms].iter());
        prop_assert_eq!(hist.counts[edges.num_bins() - 1], 1);
        prop_assert_eq!(hist.total(), 1);
    }
}

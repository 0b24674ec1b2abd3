//! Interpretation of the textual output of the model checker

use std::sync::LazyLock;

use regex::Regex;

/// Substring by which the model checker reports a refuted property
pub const REFUTED: &str = "is false";

/// Substring by which the model checker reports a proven property
pub const PROVEN: &str = "is true";

static TIME_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time\s*=\s*(\d+)").expect("time assignment regex is valid"));

/// Check whether the output reports a refuted property
pub fn is_refuted(output: &str) -> bool {
    output.contains(REFUTED)
}

/// Check whether the output reports a proven property
pub fn is_proven(output: &str) -> bool {
    output.contains(PROVEN)
}

/// All values assigned to `time` in a trace, in order of appearance
pub fn completion_times(output: &str) -> Vec<i64> {
    TIME_ASSIGNMENT
        .captures_iter(output)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Largest value assigned to `time` in a trace
pub fn final_time(output: &str) -> Option<i64> {
    completion_times(output).into_iter().max()
}

/// Lines of a trace with trailing whitespace removed
pub fn trace_lines(output: &str) -> Vec<String> {
    output.lines().map(|l| l.trim_end().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BMC_OUTPUT: &str = "\
*** This is NuSMV 2.6.0 (compiled on Wed Oct 14 15:37:51 2015)
-- specification  G COUNT_U1_t1 < 1  is false
-- as demonstrated by the following execution sequence
Trace Description: BMC Counterexample
Trace Type: Counterexample
  -> State: 1.1 <-
    time = 0
    COUNT_U1_t1 = 0
  -> State: 1.2 <-
    time = 12
  -> State: 1.3 <-
    time=45
    COUNT_U1_t1 = 1
";

    #[test]
    fn test_refutation() {
        assert!(is_refuted(BMC_OUTPUT));
        assert!(!is_proven(BMC_OUTPUT));
        assert!(!is_refuted("-- no counterexample found with bound 100"));
        assert!(is_proven("-- specification AG !(x) is true"));
    }

    #[test]
    fn test_completion_times() {
        assert_eq!(completion_times(BMC_OUTPUT), vec![0, 12, 45]);
        assert_eq!(final_time(BMC_OUTPUT), Some(45));
        assert_eq!(final_time("no trace"), None);
    }

    #[test]
    fn test_time_must_be_assigned() {
        assert_eq!(completion_times("time <= 50\ntime = 7"), vec![7]);
    }

    #[test]
    fn test_trace_lines_strip_trailing_whitespace() {
        let lines = trace_lines(BMC_OUTPUT);
        assert_eq!(lines[3], "Trace Description: BMC Counterexample");
        assert_eq!(lines.len(), BMC_OUTPUT.lines().count());
    }
}

//! Tests the solver interaction against a scripted stand-in of the model
//! checker (`tests/resources/fake_smv.sh`)

#[cfg(test)]
#[cfg(unix)]
mod test_fake_solver {
    use std::{fs, path::PathBuf, time::Duration};

    use deadline_smv::{
        NUSMV_PROMPT, PathOracle, SmvBackend, SmvSession, SmvSolver, SolverCfg, SolverError,
        output::{final_time, is_refuted},
    };

    fn resource(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("resources")
            .join(name)
    }

    /// Solver configuration running the fake solver through `sh`
    fn fake_solver(bmc_time: &str, feasible_from: i64) -> SolverCfg {
        SolverCfg::new(
            "sh".to_string(),
            vec![
                resource("fake_smv.sh").to_string_lossy().to_string(),
                bmc_time.to_string(),
                feasible_from.to_string(),
            ],
            NUSMV_PROMPT.to_string(),
        )
    }

    fn bmc_model(spec: &str) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".smv").tempfile().unwrap();
        let model = fs::read_to_string(resource("model.smv")).unwrap();
        fs::write(file.path(), format!("{model}\nLTLSPEC {spec}\n")).unwrap();
        file
    }

    #[test]
    fn test_bmc_refutation() {
        let solver = SmvSolver::new(fake_solver("45", 0));
        let model = bmc_model("G(COUNT_U1_t1 < 1)");

        let outcome = solver
            .run_bmc(model.path(), 100, Duration::from_secs(10))
            .unwrap();

        assert!(outcome.elapsed().is_some());
        let out = outcome.output_lossy();
        assert!(is_refuted(&out), "unexpected output: {out}");
        assert_eq!(final_time(&out), Some(45));
    }

    #[test]
    fn test_bmc_no_counterexample() {
        let solver = SmvSolver::new(fake_solver("45", 0));
        let model = bmc_model("G(!((COUNT_U1_t1 >= 1) & (time < 45)))");

        let outcome = solver
            .run_bmc(model.path(), 100, Duration::from_secs(10))
            .unwrap();

        assert!(!is_refuted(&outcome.output_lossy()));
    }

    #[test]
    fn test_bmc_timeout() {
        let solver = SmvSolver::new(fake_solver("hang", 0))
            .with_poll_interval(Duration::from_millis(20));
        let model = bmc_model("G(COUNT_U1_t1 < 1)");

        let outcome = solver
            .run_bmc(model.path(), 100, Duration::from_millis(300))
            .unwrap();

        assert!(outcome.timed_out());
    }

    #[test]
    fn test_session_answers_queries() {
        let solver = SmvSolver::new(fake_solver("none", 56));
        let mut session = solver.open_session(&resource("model.smv")).unwrap();

        let path = session
            .get_path("(COUNT_U1_t1 = 1) & (time <= 60)")
            .unwrap()
            .expect("deadline 60 is feasible");
        assert!(path.contains("time = 60"));

        assert_eq!(
            session.get_path("(COUNT_U1_t1 = 1) & (time <= 55)").unwrap(),
            None
        );
        assert!(
            session
                .get_path("(COUNT_U1_t1 = 1) & (time <= 56)")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_session_reports_unexpected_answers() {
        let mut session = SmvSession::open(&fake_solver("none", 0), &resource("model.smv")).unwrap();

        let res = session.execute("show_vars");
        let answer = res.unwrap();
        assert_eq!(answer, vec!["ERROR: unknown command show_vars".to_string()]);

        // a target without deadline is never reachable for the fake solver
        assert_eq!(session.get_path("COUNT_U1_t1 = 1").unwrap(), None);
    }

    #[test]
    fn test_session_for_missing_solver() {
        let cfg = SolverCfg::new(
            "this-model-checker-does-not-exist".to_string(),
            vec![],
            NUSMV_PROMPT.to_string(),
        );
        assert!(matches!(
            SmvSession::open(&cfg, &resource("model.smv")),
            Err(SolverError::Spawn { .. })
        ));
    }
}

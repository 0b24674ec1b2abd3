//! Checks the deadline specification builder on all bundled schedules

#[cfg(test)]
mod test_schedule_resources {
    use std::{env, fs};

    use deadline_schedule::{DeadlineSpecBuilder, Schedule, TaskCounts};
    use walkdir::WalkDir;

    const SCHEDULE_FOLDER: &str = "./tests/resources/schedules";

    fn all_schedules() -> Vec<(String, Schedule)> {
        println!("Start {}", env::current_dir().unwrap().display());

        let mut schedules = Vec::new();
        for entry in WalkDir::new(SCHEDULE_FOLDER)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let f_name = entry.file_name().to_string_lossy().to_string();
            if !f_name.ends_with(".json") {
                continue;
            }
            println!("Parsing schedule {f_name}");

            let input = fs::read_to_string(entry.path()).unwrap();
            let schedule = Schedule::from_json_str(&input)
                .unwrap_or_else(|err| panic!("Failed to parse {f_name}: {err}"));
            schedules.push((f_name, schedule));
        }

        assert!(!schedules.is_empty(), "No schedules found");
        schedules
    }

    #[test]
    fn test_every_deadline_within_horizon() {
        for (f_name, schedule) in all_schedules() {
            for task in schedule.ordered_tasks() {
                assert!(
                    task.deadline() <= schedule.horizon().end(),
                    "{f_name}: {task} exceeds the horizon"
                );
            }
        }
    }

    #[test]
    fn test_spec_is_deterministic_on_all_schedules() {
        for (f_name, schedule) in all_schedules() {
            let first = DeadlineSpecBuilder::default().build(&schedule).to_string();
            let second = DeadlineSpecBuilder::default().build(&schedule).to_string();
            assert_eq!(first, second, "{f_name}: output differs between runs");
        }
    }

    #[test]
    fn test_one_spec_line_per_task() {
        for (f_name, schedule) in all_schedules() {
            let spec = DeadlineSpecBuilder::default().build(&schedule);
            let n_spec_lines = spec
                .to_string()
                .lines()
                .filter(|l| l.starts_with("SPEC "))
                .count();
            assert_eq!(n_spec_lines, schedule.task_count(), "{f_name}");
        }
    }

    /// Splitting a schedule into single task schedules and chaining the counts
    /// yields the same targets as building the whole schedule at once
    #[test]
    fn test_chained_single_task_specs_agree_with_full_spec() {
        for (f_name, schedule) in all_schedules() {
            let full = DeadlineSpecBuilder::default().build(&schedule);

            let mut counts = TaskCounts::new();
            for (task, expected) in schedule.ordered_tasks().iter().zip(full.targets()) {
                let before = counts.get(task.unit(), task.name());

                let single = schedule.single_task(task).unwrap();
                let spec = DeadlineSpecBuilder::new(counts.clone()).build(&single);

                assert_eq!(spec.targets(), std::slice::from_ref(expected), "{f_name}");
                counts = spec.final_counts().clone();
                assert_eq!(counts.get(task.unit(), task.name()), before + 1, "{f_name}");
            }
            assert_eq!(&counts, full.final_counts(), "{f_name}");
        }
    }
}

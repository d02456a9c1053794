use super::*;

fn record(levels: Vec<LevelReport>) -> CycleRecord {
    CycleRecord {
        status: CycleStatus::Optimal,
        snapshot: None,
        levels,
        used_fallback: false,
        consecutive_timeouts: 0,
        elapsed: Duration::ZERO,
    }
}

#[test]
fn test_cycle_status_is_ordered_by_severity() {
    assert!(CycleStatus::Optimal < CycleStatus::Relaxed);
    assert!(CycleStatus::Relaxed < CycleStatus::Degraded);
    assert!(CycleStatus::Degraded < CycleStatus::Escalated);
    assert_eq!(
        CycleStatus::Relaxed.max(CycleStatus::Degraded),
        CycleStatus::Degraded
    );
}

#[test]
fn test_fault_display() {
    let fault = Fault::InfeasibleLevel { level: 2 };
    assert_eq!(fault.to_string(), "Level 2 is infeasible");

    let fault = Fault::MalformedTask {
        task: "reach".to_string(),
        error: Error::EmptyLevel,
    };
    assert_eq!(
        fault.to_string(),
        "Task reach was rejected: Cannot aggregate an empty list of tasks"
    );
}

#[test]
fn test_only_rejected_tasks_keep_the_computed_command() {
    assert!(!Fault::MalformedTask {
        task: "reach".to_string(),
        error: Error::EmptyLevel,
    }
    .requires_fallback());
    assert!(Fault::InfeasibleLevel { level: 0 }.requires_fallback());
    assert!(Fault::UnboundedLevel { level: 0 }.requires_fallback());
    assert!(Fault::SolverTimeout {
        level: 0,
        budget: Duration::from_micros(100)
    }
    .requires_fallback());
}

#[test]
fn test_record_collects_faults_and_warnings_of_all_levels() {
    let mut first = LevelReport::new(0, "first");
    first.faults.push(Fault::InfeasibleLevel { level: 0 });
    first.warnings.push(Warning::SaturatedHierarchy { level: 0 });
    let mut second = LevelReport::new(1, "second");
    second.faults.push(Fault::UnboundedLevel { level: 1 });

    let record = record(vec![first, second]);

    assert_eq!(record.faults().count(), 2);
    assert_eq!(record.warnings().count(), 1);
    assert!(record.has_fault(|f| matches!(f, Fault::UnboundedLevel { .. })));
    assert!(!record.has_fault(|f| matches!(f, Fault::SolverTimeout { .. })));
}

//! Unit scheduler
//!
//! Decides what the work loop does next: drain the initial-unit queue, honor
//! an agent-requested deterministic unit (cooldown permitting), follow a
//! deterministic unit's `next` routing, or fall back to an agentic unit. A
//! cap on consecutive decider turns keeps the loop from planning in circles.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::WorkLoopConfig;
use crate::domain::{Unit, UnitDefinition, UnitResult, UnitStatus};

/// Initial-unit queue file, relative to the project root.
pub const INITIAL_UNITS_FILE: &str = ".aidp/work_loop/initial_units.txt";

/// Error kinds for scheduling
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid unit name: {0:?}")]
    InvalidUnit(String),
}

/// What the previous step was, as recorded by the engine
#[derive(Debug, Clone)]
enum LastStep {
    Agentic {
        name: String,
        requested_next: Option<String>,
    },
    Deterministic {
        name: String,
        status: UnitStatus,
    },
}

/// Record of the most recent agentic turn
#[derive(Debug, Clone)]
struct AgenticRecord {
    #[allow(dead_code)]
    name: String,
    summary: String,
}

/// Decides the next unit for the work loop.
pub struct UnitScheduler {
    config: WorkLoopConfig,
    clock: Arc<dyn Clock>,
    initial_queue: VecDeque<String>,
    history: Vec<(String, UnitResult)>,
    last_finished: HashMap<String, DateTime<Utc>>,
    last: Option<LastStep>,
    last_agentic: Option<AgenticRecord>,
    consecutive_deciders: u32,
    decider_capped: bool,
}

impl UnitScheduler {
    pub fn new(config: WorkLoopConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            initial_queue: VecDeque::new(),
            history: Vec::new(),
            last_finished: HashMap::new(),
            last: None,
            last_agentic: None,
            consecutive_deciders: 0,
            decider_capped: false,
        }
    }

    /// Load the initial-unit queue from `.aidp/work_loop/initial_units.txt`.
    ///
    /// One unit name per line; blank lines and `#` comments are skipped. A
    /// missing file means an empty queue.
    pub fn load_initial_units(&mut self, project_dir: &Path) {
        let path = project_dir.join(INITIAL_UNITS_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            debug!(path = %path.display(), "load_initial_units: no file");
            return;
        };

        for line in content.lines() {
            let name = line.trim();
            if name.is_empty() || name.starts_with('#') {
                continue;
            }
            self.initial_queue.push_back(name.to_string());
        }
        info!(count = self.initial_queue.len(), "Loaded initial unit queue");
    }

    /// Directly seed the initial queue (tests, programmatic use).
    pub fn seed_initial_units(&mut self, names: Vec<String>) {
        self.initial_queue.extend(names);
    }

    /// Decide the next unit.
    pub fn next_unit(&mut self) -> Result<Unit, SchedulerError> {
        // 1. Drain the initial queue first; the decider cap is suspended
        //    while it holds entries.
        if let Some(name) = self.initial_queue.pop_front() {
            debug!(%name, remaining = self.initial_queue.len(), "next_unit: from initial queue");
            return self.resolve(&name);
        }

        // 2. Agent asked for a specific unit last turn.
        if let Some(LastStep::Agentic {
            requested_next: Some(requested),
            ..
        }) = self.last.clone()
        {
            if let Some(definition) = self.config.units.get(&requested).cloned() {
                if self.cooldown_elapsed(&definition) {
                    debug!(unit = %requested, "next_unit: honoring requested_next");
                    return Ok(Unit::Deterministic { definition });
                }
                debug!(unit = %requested, "next_unit: requested unit still cooling down");
            } else {
                debug!(unit = %requested, "next_unit: requested unit unknown");
            }
            return self.agentic_fallback();
        }

        // 3. Deterministic unit just ran: follow its routing table.
        if let Some(LastStep::Deterministic { name, status }) = self.last.clone() {
            if let Some(definition) = self.config.units.get(&name) {
                if let Some(target) = definition.next.resolve(status) {
                    let target = target.to_string();
                    debug!(from = %name, status = %status, to = %target, "next_unit: following next map");
                    if let Some(next_def) = self.config.units.get(&target).cloned() {
                        if self.cooldown_elapsed(&next_def) {
                            return Ok(Unit::Deterministic { definition: next_def });
                        }
                        debug!(unit = %target, "next_unit: routed unit cooling down");
                        return self.agentic_fallback();
                    }
                    return self.agentic(target);
                }
            }
        }

        // 4. No rule fired: agentic primary.
        let primary = self.config.defaults.primary.clone();
        debug!(unit = %primary, "next_unit: agentic primary");
        self.agentic(primary)
    }

    /// Resolve a name to a unit: deterministic when configured, agentic
    /// otherwise.
    fn resolve(&mut self, name: &str) -> Result<Unit, SchedulerError> {
        if name.is_empty() {
            return Err(SchedulerError::InvalidUnit(name.to_string()));
        }
        match self.config.units.get(name).cloned() {
            Some(definition) => Ok(Unit::Deterministic { definition }),
            None => self.agentic(name.to_string()),
        }
    }

    /// Return an agentic unit, enforcing the decider cap.
    fn agentic(&mut self, name: String) -> Result<Unit, SchedulerError> {
        if name.is_empty() {
            return Err(SchedulerError::InvalidUnit(name));
        }
        if name == self.config.defaults.fallback_agentic && self.decider_blocked() {
            let parked = self.config.defaults.on_no_next_step.clone();
            warn!(
                deciders = self.consecutive_deciders,
                fallback = %parked,
                "Decider cap reached; scheduling on_no_next_step"
            );
            self.decider_capped = true;
            return self.resolve(&parked);
        }
        Ok(Unit::Agentic { name })
    }

    fn agentic_fallback(&mut self) -> Result<Unit, SchedulerError> {
        let fallback = self.config.defaults.fallback_agentic.clone();
        self.agentic(fallback)
    }

    fn decider_blocked(&self) -> bool {
        self.decider_capped || self.consecutive_deciders >= self.config.max_consecutive_deciders
    }

    fn cooldown_elapsed(&self, definition: &UnitDefinition) -> bool {
        if definition.min_interval_seconds == 0 {
            return true;
        }
        match self.last_finished.get(&definition.name) {
            None => true,
            Some(finished_at) => {
                self.clock.now() - *finished_at >= Duration::seconds(definition.min_interval_seconds as i64)
            }
        }
    }

    /// Record a finished agentic turn.
    ///
    /// The consecutive-decider counter only advances once the initial queue
    /// has drained.
    pub fn record_agentic(&mut self, name: &str, requested_next: Option<String>, summary: impl Into<String>) {
        if name == self.config.defaults.fallback_agentic && self.initial_queue.is_empty() {
            self.consecutive_deciders += 1;
        } else if name != self.config.defaults.fallback_agentic {
            self.consecutive_deciders = 0;
        }
        debug!(
            %name,
            ?requested_next,
            deciders = self.consecutive_deciders,
            "record_agentic"
        );

        self.last_agentic = Some(AgenticRecord {
            name: name.to_string(),
            summary: summary.into(),
        });
        self.last = Some(LastStep::Agentic {
            name: name.to_string(),
            requested_next,
        });
    }

    /// Record a finished deterministic unit, feeding routing and cooldowns.
    pub fn record_deterministic(&mut self, result: UnitResult) {
        debug!(unit = %result.name, status = %result.status, "record_deterministic");
        self.last_finished.insert(result.name.clone(), result.finished_at);
        self.last = Some(LastStep::Deterministic {
            name: result.name.clone(),
            status: result.status,
        });
        self.history.push((result.name.clone(), result));
        self.consecutive_deciders = 0;
        self.decider_capped = false;
    }

    /// Tail of recent deterministic results, for prompt templating.
    pub fn deterministic_context(&self) -> &[(String, UnitResult)] {
        let window = self.config.context_window.max(1);
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    /// Summary of the last agentic turn, if any.
    pub fn last_agentic_summary(&self) -> Option<&str> {
        self.last_agentic.as_ref().map(|r| r.summary.as_str())
    }

    /// Remaining initial-queue entries.
    pub fn initial_queue_len(&self) -> usize {
        self.initial_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::WorkLoopDefaults;
    use crate::domain::{NextMap, UnitKind};

    fn config_with_units() -> WorkLoopConfig {
        let mut units = HashMap::new();
        units.insert(
            "run_full_tests".to_string(),
            UnitDefinition {
                name: "run_full_tests".to_string(),
                kind: UnitKind::Command,
                command: Some("cargo test".to_string()),
                min_interval_seconds: 60,
                next: NextMap {
                    success: Some("implement_next".to_string()),
                    failure: Some("fix_failures".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        units.insert(
            "wait_for_input".to_string(),
            UnitDefinition {
                name: "wait_for_input".to_string(),
                kind: UnitKind::Wait,
                ..Default::default()
            },
        );
        WorkLoopConfig {
            units,
            defaults: WorkLoopDefaults::default(),
            max_consecutive_deciders: 2,
            context_window: 3,
            commands: Vec::new(),
        }
    }

    fn scheduler() -> (UnitScheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (UnitScheduler::new(config_with_units(), clock.clone()), clock)
    }

    fn result(name: &str, status: UnitStatus, clock: &ManualClock) -> UnitResult {
        UnitResult::new(name, status, clock.now(), clock.now())
    }

    #[test]
    fn test_first_call_returns_primary() {
        let (mut s, _) = scheduler();
        let unit = s.next_unit().unwrap();
        assert_eq!(unit, Unit::Agentic {
            name: "implement_next".to_string()
        });
    }

    #[test]
    fn test_initial_queue_drains_first() {
        let (mut s, _) = scheduler();
        s.seed_initial_units(vec!["run_full_tests".to_string(), "custom_agentic".to_string()]);

        let first = s.next_unit().unwrap();
        assert_eq!(first.name(), "run_full_tests");
        assert!(!first.is_agentic());

        let second = s.next_unit().unwrap();
        assert_eq!(second, Unit::Agentic {
            name: "custom_agentic".to_string()
        });

        assert_eq!(s.next_unit().unwrap().name(), "implement_next");
    }

    #[test]
    fn test_load_initial_units_file() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join(".aidp/work_loop");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("initial_units.txt"),
            "# startup plan\nrun_full_tests\n\nwait_for_input\n",
        )
        .unwrap();

        let (mut s, _) = scheduler();
        s.load_initial_units(temp.path());
        assert_eq!(s.initial_queue_len(), 2);
    }

    #[test]
    fn test_requested_next_honored_when_cool() {
        let (mut s, _) = scheduler();
        s.record_agentic("implement_next", Some("run_full_tests".to_string()), "done");

        let unit = s.next_unit().unwrap();
        assert_eq!(unit.name(), "run_full_tests");
        assert!(!unit.is_agentic());
    }

    #[test]
    fn test_requested_next_in_cooldown_falls_back() {
        let (mut s, clock) = scheduler();

        // Run it once so a cooldown window opens.
        s.record_deterministic(result("run_full_tests", UnitStatus::Success, &clock));
        s.record_agentic("implement_next", Some("run_full_tests".to_string()), "again please");

        let unit = s.next_unit().unwrap();
        assert_eq!(unit, Unit::Agentic {
            name: "decide_whats_next".to_string()
        });

        // Once the interval passes, the request is honored again.
        clock.advance_secs(61);
        s.record_agentic("implement_next", Some("run_full_tests".to_string()), "retry");
        assert_eq!(s.next_unit().unwrap().name(), "run_full_tests");
    }

    #[test]
    fn test_unknown_requested_next_falls_back() {
        let (mut s, _) = scheduler();
        s.record_agentic("implement_next", Some("no_such_unit".to_string()), "hmm");
        assert_eq!(s.next_unit().unwrap(), Unit::Agentic {
            name: "decide_whats_next".to_string()
        });
    }

    #[test]
    fn test_deterministic_routing_by_status() {
        let (mut s, clock) = scheduler();

        s.record_deterministic(result("run_full_tests", UnitStatus::Failure, &clock));
        assert_eq!(s.next_unit().unwrap(), Unit::Agentic {
            name: "fix_failures".to_string()
        });

        s.record_deterministic(result("run_full_tests", UnitStatus::Success, &clock));
        assert_eq!(s.next_unit().unwrap(), Unit::Agentic {
            name: "implement_next".to_string()
        });
    }

    #[test]
    fn test_no_route_returns_primary() {
        let (mut s, clock) = scheduler();
        // wait_for_input has no next map.
        s.record_deterministic(result("wait_for_input", UnitStatus::Waiting, &clock));
        assert_eq!(s.next_unit().unwrap().name(), "implement_next");
    }

    #[test]
    fn test_decider_cap_parks_on_wait() {
        let (mut s, clock) = scheduler();

        // Each decider turn keeps requesting an unknown unit, so the
        // fallback would be another decider turn.
        s.record_agentic("decide_whats_next", Some("nope".to_string()), "thinking");
        assert_eq!(s.next_unit().unwrap().name(), "decide_whats_next");

        s.record_agentic("decide_whats_next", Some("nope".to_string()), "still thinking");
        // Two consecutive deciders: the cap trips and the wait unit is
        // scheduled instead.
        let unit = s.next_unit().unwrap();
        assert_eq!(unit.name(), "wait_for_input");
        assert!(!unit.is_agentic());

        // The cap stays engaged until a deterministic unit actually runs.
        s.record_agentic("decide_whats_next", Some("nope".to_string()), "again");
        assert_eq!(s.next_unit().unwrap().name(), "wait_for_input");

        s.record_deterministic(result("wait_for_input", UnitStatus::Waiting, &clock));
        s.record_agentic("implement_next", Some("nope".to_string()), "after wait");
        assert_eq!(s.next_unit().unwrap(), Unit::Agentic {
            name: "decide_whats_next".to_string()
        });
    }

    #[test]
    fn test_decider_counter_suspended_while_queue_drains() {
        let (mut s, _) = scheduler();
        s.seed_initial_units(vec!["a".to_string(), "b".to_string()]);

        // Decider turns while the queue still holds entries do not count.
        s.record_agentic("decide_whats_next", None, "during drain");
        s.initial_queue.pop_front();
        s.record_agentic("decide_whats_next", None, "still draining");
        s.initial_queue.pop_front();

        assert_eq!(s.consecutive_deciders, 0);

        s.record_agentic("decide_whats_next", None, "now it counts");
        assert_eq!(s.consecutive_deciders, 1);
    }

    #[test]
    fn test_deterministic_context_window() {
        let (mut s, clock) = scheduler();
        for i in 0..5 {
            s.record_deterministic(result(&format!("u{}", i), UnitStatus::Success, &clock));
        }

        let ctx = s.deterministic_context();
        assert_eq!(ctx.len(), 3, "window from config");
        assert_eq!(ctx[0].0, "u2");
        assert_eq!(ctx[2].0, "u4");
    }

    #[test]
    fn test_last_agentic_summary() {
        let (mut s, _) = scheduler();
        assert!(s.last_agentic_summary().is_none());
        s.record_agentic("implement_next", None, "wrote the parser");
        assert_eq!(s.last_agentic_summary(), Some("wrote the parser"));
    }

    #[test]
    fn test_cooldown_property() {
        // A unit with min_interval_seconds=S is not schedulable again until
        // S seconds have passed, measured on the injected clock.
        let (mut s, clock) = scheduler();

        s.record_deterministic(result("run_full_tests", UnitStatus::Success, &clock));
        for advance in [10, 20, 29] {
            clock.advance_secs(advance);
            s.record_agentic("implement_next", Some("run_full_tests".to_string()), "req");
            assert_eq!(
                s.next_unit().unwrap().name(),
                "decide_whats_next",
                "still cooling down"
            );
        }

        // 59s elapsed so far; cross the 60s boundary.
        clock.advance_secs(2);
        s.record_agentic("implement_next", Some("run_full_tests".to_string()), "req");
        assert_eq!(s.next_unit().unwrap().name(), "run_full_tests");
    }
}

//! Batch planning
//!
//! Turns the ordered session gaps into a bounded prefix that fits the calls
//! currently available. Gaps are never reordered; an interrupted import
//! always leaves the latest sessions outstanding, never the earliest.

use crate::models::{GapReport, ProcessingPlan, SessionGap};

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchPlanner {
    /// Upper bound on items per plan regardless of quota
    max_batch: Option<usize>,
}

impl BatchPlanner {
    pub fn new(max_batch: Option<usize>) -> Self {
        Self { max_batch }
    }

    /// Plan from a full gap report
    ///
    /// `available_calls = None` means unbounded; `Some(0)` yields an empty
    /// plan, which tells the caller to wait for a quota reset.
    pub fn build_plan(&self, report: &GapReport, available_calls: Option<u32>) -> ProcessingPlan {
        self.plan_gaps(&report.session_gaps, available_calls)
    }

    /// Plan from the gaps still outstanding
    pub fn plan_gaps(&self, gaps: &[SessionGap], available_calls: Option<u32>) -> ProcessingPlan {
        let mut ordered: Vec<&SessionGap> = gaps.iter().collect();
        // stable: equal keys keep detection order
        ordered.sort_by_key(|gap| gap.order_key());

        let limit = match (available_calls.map(|n| n as usize), self.max_batch) {
            (Some(calls), Some(batch)) => calls.min(batch),
            (Some(calls), None) => calls,
            (None, Some(batch)) => batch,
            (None, None) => ordered.len(),
        };

        let plan = ProcessingPlan {
            items: ordered.into_iter().take(limit).cloned().collect(),
        };

        tracing::info!(
            outstanding = gaps.len(),
            available_calls = ?available_calls,
            "Planned {} sessions across {} events",
            plan.len(),
            plan.event_count()
        );

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventFormat, SessionType, SubDatasetKind};
    use std::collections::BTreeSet;

    fn gap(round_number: u32, session_number: u32) -> SessionGap {
        SessionGap {
            session_id: None,
            year: 2025,
            round_number,
            provider_round: round_number,
            event_name: format!("Round {}", round_number),
            event_format: EventFormat::Conventional,
            session_type: SessionType::Race,
            session_number,
            missing: BTreeSet::from([SubDatasetKind::Weather]),
        }
    }

    fn rounds(plan: &ProcessingPlan) -> Vec<u32> {
        plan.iter().map(|g| g.round_number).collect()
    }

    #[test]
    fn test_out_of_order_input_is_planned_chronologically() {
        let report = GapReport {
            season_year: 2025,
            session_gaps: vec![gap(1, 5), gap(3, 5), gap(2, 5)],
            total_calls_needed: 3,
            ..Default::default()
        };

        let plan = BatchPlanner::default().build_plan(&report, None);
        assert_eq!(rounds(&plan), vec![1, 2, 3]);
        assert_eq!(plan.event_count(), 3);
    }

    #[test]
    fn test_prefix_respects_available_calls() {
        let gaps = vec![gap(1, 1), gap(1, 2), gap(2, 1), gap(2, 2), gap(3, 1)];
        let planner = BatchPlanner::default();

        let plan = planner.plan_gaps(&gaps, Some(2));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.event_count(), 1);
        assert_eq!(plan.items[1].session_number, 2);

        assert!(planner.plan_gaps(&gaps, Some(0)).is_empty());
        assert_eq!(planner.plan_gaps(&gaps, Some(100)).len(), 5);
    }

    #[test]
    fn test_max_batch_caps_plan() {
        let gaps = vec![gap(1, 1), gap(2, 1), gap(3, 1)];
        let planner = BatchPlanner::new(Some(2));

        assert_eq!(planner.plan_gaps(&gaps, None).len(), 2);
        assert_eq!(planner.plan_gaps(&gaps, Some(1)).len(), 1);
    }
}

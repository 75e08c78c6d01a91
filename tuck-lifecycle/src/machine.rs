use tuck_shared::{BookingStatus, LifecycleRequest, Rejection};

/// One accepted edge of the lifecycle graph. `from == to` marks an idempotent replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

impl Step {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Result of asking the state machine for a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Accepted(Step),
    Rejected(Rejection),
}

impl Transition {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Transition::Accepted(_))
    }
}

/// The booking lifecycle graph.
///
/// Pure and total. Accepts exactly the next forward status, `cancel` from `pending` or
/// `assigned`, and a replay of the current status (as a no-op). Everything else is rejected;
/// nothing is coerced.
pub fn transition(current: BookingStatus, requested: LifecycleRequest) -> Transition {
    let target = requested.target();

    if target == current {
        return Transition::Accepted(Step { from: current, to: current });
    }

    if current.is_terminal() {
        return Transition::Rejected(Rejection::Terminal { from: current, requested });
    }

    if target == BookingStatus::Cancelled {
        return if current.is_cancellable() {
            Transition::Accepted(Step { from: current, to: BookingStatus::Cancelled })
        } else {
            Transition::Rejected(Rejection::CancelNotAllowed { from: current })
        };
    }

    if current.successor() == Some(target) {
        return Transition::Accepted(Step { from: current, to: target });
    }

    match (current.position(), target.position()) {
        (Some(from), Some(to)) if to < from => {
            Transition::Rejected(Rejection::Backward { from: current, requested })
        }
        _ => Transition::Rejected(Rejection::SkippedStep { from: current, requested }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    fn advance(status: BookingStatus) -> LifecycleRequest {
        LifecycleRequest::Advance(status)
    }

    #[test]
    fn test_full_forward_walk() {
        let mut current = Pending;
        for next in BookingStatus::FORWARD.iter().skip(1) {
            match transition(current, advance(*next)) {
                Transition::Accepted(step) => {
                    assert_eq!(step.from, current);
                    assert_eq!(step.to, *next);
                    current = step.to;
                }
                Transition::Rejected(r) => panic!("rejected {:?}", r),
            }
        }
        assert_eq!(current, Completed);
    }

    #[test]
    fn test_skip_is_rejected() {
        assert_eq!(
            transition(Pending, advance(Accepted)),
            Transition::Rejected(Rejection::SkippedStep { from: Pending, requested: advance(Accepted) })
        );
    }

    #[test]
    fn test_backward_is_rejected() {
        assert_eq!(
            transition(PickedUp, advance(Accepted)),
            Transition::Rejected(Rejection::Backward { from: PickedUp, requested: advance(Accepted) })
        );
    }

    #[test]
    fn test_cancel_window() {
        assert!(transition(Pending, LifecycleRequest::Cancel).is_accepted());
        assert!(transition(Assigned, LifecycleRequest::Cancel).is_accepted());
        assert_eq!(
            transition(Accepted, LifecycleRequest::Cancel),
            Transition::Rejected(Rejection::CancelNotAllowed { from: Accepted })
        );
        assert_eq!(
            transition(Delivered, LifecycleRequest::Cancel),
            Transition::Rejected(Rejection::CancelNotAllowed { from: Delivered })
        );
    }

    #[test]
    fn test_replay_is_noop() {
        match transition(EnRoutePickup, advance(EnRoutePickup)) {
            Transition::Accepted(step) => assert!(step.is_noop()),
            other => panic!("expected no-op accept, got {:?}", other),
        }
        match transition(Cancelled, LifecycleRequest::Cancel) {
            Transition::Accepted(step) => assert!(step.is_noop()),
            other => panic!("expected no-op accept, got {:?}", other),
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert_eq!(
            transition(Completed, LifecycleRequest::Cancel),
            Transition::Rejected(Rejection::Terminal { from: Completed, requested: LifecycleRequest::Cancel })
        );
        assert_eq!(
            transition(Cancelled, advance(Assigned)),
            Transition::Rejected(Rejection::Terminal { from: Cancelled, requested: advance(Assigned) })
        );
    }

    #[test]
    fn test_advance_to_cancelled_behaves_like_cancel() {
        assert_eq!(
            transition(Assigned, advance(Cancelled)),
            transition(Assigned, LifecycleRequest::Cancel)
        );
    }
}

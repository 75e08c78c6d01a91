use tuck_core::{EngineError, EngineResult};
use tuck_shared::{Actor, Booking, BookingStatus, LifecycleRequest, Role};

/// Which actor may propose which move on a given booking.
///
/// Role claims themselves are trusted; this only checks that the claimed identity matches the
/// booking. Self-assignment (`assigned` from a driver) is handled by the coordinator.
pub fn permits(actor: &Actor, booking: &Booking, request: LifecycleRequest) -> EngineResult<()> {
    let allowed = match actor.role {
        Role::Admin => true,
        Role::Customer => {
            request == LifecycleRequest::Cancel && actor.is(Role::Customer, &booking.customer_id)
        }
        Role::Driver => {
            matches!(request, LifecycleRequest::Advance(_))
                && booking
                    .driver_id
                    .as_deref()
                    .is_some_and(|driver| actor.is(Role::Driver, driver))
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(EngineError::NotPermitted { role: actor.role, request })
    }
}

/// Admins may assign anyone; a driver may only assign themself
pub fn permits_assignment(actor: &Actor, driver_id: &str) -> EngineResult<()> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Driver if actor.is(Role::Driver, driver_id) => Ok(()),
        role => Err(EngineError::NotPermitted {
            role,
            request: LifecycleRequest::Advance(BookingStatus::Assigned),
        }),
    }
}

use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding database queries issued by the search service.
pub type DbCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates a circuit breaker for database operations to prevent cascading failures.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// While the circuit is open the search skips collections immediately
/// instead of waiting on a pool that cannot hand out connections.
pub fn create_db_circuit_breaker() -> DbCircuitBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe::futures::CircuitBreaker;
    use failsafe::Error;

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let cb = create_db_circuit_breaker();

        for _ in 0..5 {
            let result: Result<(), Error<&str>> =
                cb.call(async { Err::<(), &str>("connection refused") }).await;
            assert!(matches!(result, Err(Error::Inner("connection refused"))));
        }

        let result: Result<(), Error<&str>> = cb.call(async { Ok::<(), &str>(()) }).await;
        match result {
            Err(Error::Rejected) => {}
            _ => panic!("Expected circuit to be open and reject requests"),
        }
    }

    #[tokio::test]
    async fn passes_successful_calls_through() {
        let cb = create_db_circuit_breaker();
        let result: Result<i64, Error<&str>> = cb.call(async { Ok::<i64, &str>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}

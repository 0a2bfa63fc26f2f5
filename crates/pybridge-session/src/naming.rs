//! Reserved interpreter-side names.

/// Prefix of every generated remote variable.
pub(crate) const VAR_PREFIX: &str = "___pye_var___";

/// Remote list holding the arguments of a pending `call`.
pub(crate) const ARGS_VAR: &str = "___pye_args";

/// Remote trampoline that forwards a call to a bound host callable.
pub(crate) const CALL_HOST: &str = "___pye_call_host";

/// Remote trampoline that wraps a bound host generator.
pub(crate) const HOST_GENERATOR: &str = "___pye_host_generator";

/// Loop variable of the orphan reaper statement.
pub(crate) const REAP_VAR: &str = "___pye_n";

/// Scramble a counter into a 32-bit value.
///
/// The multiplier is odd, so the map is a bijection on `u32`: distinct
/// counters always give distinct names.
const fn shuffle(n: u32) -> u32 {
    n.wrapping_mul(1_664_525).wrapping_add(1_013_904_223)
}

/// Remote variable name for the `n`th proxy of a session.
pub(crate) fn var_name(n: u32) -> String {
    format!("{VAR_PREFIX}{:08X}", shuffle(n))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_names_are_distinct_identifiers() {
        let names: HashSet<String> = (0..10_000).map(var_name).collect();
        assert_eq!(names.len(), 10_000);
        assert!(names.iter().all(|n| pybridge_core::is_identifier(n)));
    }

    #[test]
    fn test_first_name_is_stable() {
        assert_eq!(var_name(0), "___pye_var___3C6EF35F");
        assert_eq!(var_name(1), "___pye_var___3C88596C");
    }
}

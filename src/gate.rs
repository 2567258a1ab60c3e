//! Command authorization against the configured allow-list.

use regex::RegexSet;

use crate::error::GatewayError;

/// Matches requested commands against an ordered set of anchored regular
/// expressions.
///
/// A command is allowed iff at least one pattern matches from the start of
/// the command string; the right-hand side is unconstrained. Matching is
/// case-sensitive. The set is compiled once at startup and never mutated.
#[derive(Debug)]
pub struct CommandGate {
    set: RegexSet,
}

impl CommandGate {
    /// Compiles the allow-list. Fails on the first invalid pattern so a typo
    /// in the configuration aborts startup instead of silently denying.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<CommandGate, GatewayError> {
        let anchored: Vec<String> = patterns
            .iter()
            .map(|p| format!(r"\A(?:{})", p.as_ref()))
            .collect();
        let set = RegexSet::new(&anchored)
            .map_err(|e| GatewayError::Config(format!("invalid allow-list regex: {e}")))?;
        Ok(CommandGate { set })
    }

    /// Returns `Forbidden` when no pattern matches the command.
    pub fn check(&self, command: &str) -> Result<(), GatewayError> {
        if self.set.is_match(command) {
            Ok(())
        } else {
            Err(GatewayError::Forbidden(command.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CommandGate;
    use crate::error::GatewayError;

    #[test]
    fn matches_from_the_start_only() {
        let gate = CommandGate::new(&["show "]).expect("compile");
        assert!(gate.check("show system").is_ok());
        assert!(gate.check("show vlan 10").is_ok());
        assert!(gate.check("reshow system").is_err());
        assert!(gate.check("reload").is_err());
    }

    #[test]
    fn right_side_is_free() {
        let gate = CommandGate::new(&["ping \\S+"]).expect("compile");
        assert!(gate.check("ping 10.1.1.1 count 3").is_ok());
        assert!(gate.check("ping").is_err());
    }

    #[test]
    fn matching_is_case_sensitive() {
        let gate = CommandGate::new(&["show "]).expect("compile");
        assert!(gate.check("Show system").is_err());
    }

    #[test]
    fn empty_list_denies_everything() {
        let gate = CommandGate::new::<&str>(&[]).expect("compile");
        assert!(matches!(
            gate.check("show system"),
            Err(GatewayError::Forbidden(_))
        ));
    }

    #[test]
    fn invalid_pattern_fails_at_build_time() {
        let err = CommandGate::new(&["show ["]).expect_err("bad regex must fail");
        assert!(matches!(err, GatewayError::Config(_)));
    }
}

//! Field-level validators for computer setup values.
//!
//! These are pure checks shared by the non-interactive flag path, the config
//! document path and the interactive prompts.

use regex::Regex;

use crate::errors::{Result, RidgeError};

/// Placeholder names allowed in an mpirun command template. These correspond
/// to the job-resource quantities substituted at submission time.
pub const MPIRUN_TEMPLATE_KEYS: &[&str] = &[
    "tot_num_mpiprocs",
    "num_machines",
    "num_mpiprocs_per_machine",
    "num_cores_per_machine",
    "num_cores_per_mpiproc",
];

/// Check that a job-script shebang line starts with `#!`.
pub fn validate_shebang(shebang: &str) -> Result<()> {
    if !shebang.starts_with("#!") {
        return Err(RidgeError::Format(format!(
            "The shebang line should start with '#!', got: {shebang}"
        )));
    }
    Ok(())
}

/// Validate the default number of MPI processes per machine.
///
/// Zero is a command-line sentinel meaning "unset" and collapses to `None`;
/// negative values are rejected.
pub fn validate_mpiprocs(value: Option<i64>) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(0) => Ok(None),
        Some(n) if n < 0 => Err(RidgeError::validation(
            "mpiprocs_per_machine",
            format!("must be positive, got: {n}"),
        )),
        Some(n) => Ok(Some(n as u32)),
    }
}

/// Validate the default memory per machine (kilobytes).
///
/// Unlike mpiprocs, zero is not a sentinel here: an explicit 0 is stored
/// as-is and only negative values are rejected.
pub fn validate_memory(value: Option<i64>) -> Result<Option<u64>> {
    match value {
        None => Ok(None),
        Some(n) if n < 0 => Err(RidgeError::validation(
            "default_memory_per_machine",
            format!("must be a positive int, got: {n}"),
        )),
        Some(n) => Ok(Some(n as u64)),
    }
}

/// Check that every `{placeholder}` in an mpirun command template is a known
/// job-resource key.
pub fn validate_mpirun_template(template: &str) -> Result<()> {
    // Matches {name}; literal braces are not part of the template grammar.
    let placeholder = Regex::new(r"\{([^{}]*)\}").expect("static regex");
    for capture in placeholder.captures_iter(template) {
        let key = capture.get(1).map(|m| m.as_str()).unwrap_or("");
        if !MPIRUN_TEMPLATE_KEYS.contains(&key) {
            return Err(RidgeError::Format(format!(
                "unknown replacement field '{key}' in '{template}'"
            )));
        }
    }
    Ok(())
}

/// Check that a label is not already taken.
pub fn validate_label_unique<'a, I>(label: &str, existing: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    if existing.into_iter().any(|l| l == label) {
        return Err(RidgeError::Conflict {
            label: label.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shebang_requires_hash_bang() {
        assert!(validate_shebang("#!/bin/bash").is_ok());
        assert!(validate_shebang("#!xonsh").is_ok());
        let err = validate_shebang("/bin/bash").unwrap_err();
        assert!(err.to_string().contains("The shebang line should start with"));
    }

    #[test]
    fn test_mpiprocs_zero_means_unset() {
        assert_eq!(validate_mpiprocs(Some(0)).unwrap(), None);
        assert_eq!(validate_mpiprocs(None).unwrap(), None);
        assert_eq!(validate_mpiprocs(Some(8)).unwrap(), Some(8));
    }

    #[test]
    fn test_mpiprocs_negative_rejected() {
        for n in [-1, -2, -100] {
            let err = validate_mpiprocs(Some(n)).unwrap_err();
            assert!(err.to_string().contains("must be positive"), "{err}");
        }
    }

    #[test]
    fn test_memory_zero_is_preserved() {
        // 0 is a real value for memory, not an unset sentinel.
        assert_eq!(validate_memory(Some(0)).unwrap(), Some(0));
        assert_eq!(validate_memory(None).unwrap(), None);
        assert_eq!(validate_memory(Some(1_000_000)).unwrap(), Some(1_000_000));
    }

    #[test]
    fn test_memory_negative_rejected() {
        let err = validate_memory(Some(-1)).unwrap_err();
        assert!(err.to_string().contains("must be a positive int"), "{err}");
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn test_mpirun_template_known_keys() {
        assert!(validate_mpirun_template("mpirun -np {tot_num_mpiprocs}").is_ok());
        assert!(validate_mpirun_template("srun -N {num_machines}").is_ok());
        assert!(validate_mpirun_template("mpiexec").is_ok());
    }

    #[test]
    fn test_mpirun_template_unknown_key() {
        let err = validate_mpirun_template("mpirun -np {unknown_key}").unwrap_err();
        assert!(
            err.to_string()
                .contains("unknown replacement field 'unknown_key'"),
            "{err}"
        );
    }

    #[test]
    fn test_label_unique() {
        let existing = ["alpha", "beta"];
        assert!(validate_label_unique("gamma", existing.iter().copied()).is_ok());
        let err = validate_label_unique("alpha", existing.iter().copied()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}

use std::ffi::{OsStr, OsString};

/// Set to `true` by the reload supervisor on the child it spawns.
pub const RELOAD_MARKER: &str = "MODWEB_RUN_MAIN";

pub type EnvVars = Vec<(OsString, OsString)>;

/// Which side of a reload split this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadRole {
    /// First (or only) process. Owns the companion.
    Parent,
    /// Re-executed server under a reload supervisor. Never touches the companion.
    Child,
}

impl ReloadRole {
    pub fn from_marker(value: Option<&OsStr>) -> Self {
        match value {
            Some(v) if v == "true" => Self::Child,
            _ => Self::Parent,
        }
    }

    pub fn owns_companion(&self) -> bool {
        matches!(self, Self::Parent)
    }
}

/// Environment snapshot taken once at startup, with the role derived from it.
#[derive(Debug, Clone)]
pub struct ProcessEnv {
    vars: EnvVars,
    role: ReloadRole,
}

impl ProcessEnv {
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let vars: EnvVars = vars.into_iter().collect();
        let marker = vars
            .iter()
            .rev()
            .find(|(k, _)| k == RELOAD_MARKER)
            .map(|(_, v)| v.as_os_str());
        let role = ReloadRole::from_marker(marker);
        Self { vars, role }
    }

    pub fn role(&self) -> ReloadRole {
        self.role
    }

    pub fn vars(&self) -> &[(OsString, OsString)] {
        &self.vars
    }

    /// Copy of the snapshot with every variable named in `strip` removed.
    pub fn without(&self, strip: &[String]) -> EnvVars {
        self.vars
            .iter()
            .filter(|(k, _)| !strip.iter().any(|s| k == s.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> ProcessEnv {
        ProcessEnv::from_vars(
            pairs
                .iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(v))),
        )
    }

    #[test]
    fn marker_true_means_child() {
        assert_eq!(env(&[(RELOAD_MARKER, "true")]).role(), ReloadRole::Child);
        assert!(!ReloadRole::Child.owns_companion());
    }

    #[test]
    fn absent_or_other_marker_means_parent() {
        assert_eq!(env(&[]).role(), ReloadRole::Parent);
        assert_eq!(env(&[(RELOAD_MARKER, "false")]).role(), ReloadRole::Parent);
        assert!(ReloadRole::Parent.owns_companion());
    }

    #[test]
    fn without_strips_named_variables_only() {
        let e = env(&[("VIRTUAL_ENV", "/venv"), ("PATH", "/bin"), ("HOME", "/root")]);
        let stripped = e.without(&["VIRTUAL_ENV".to_string()]);
        assert_eq!(stripped.len(), 2);
        assert!(stripped.iter().all(|(k, _)| k != "VIRTUAL_ENV"));
        assert_eq!(e.vars().len(), 3);
    }
}

//! Container security posture.

/// Linux capability names as the substrate expects them (no `CAP_` prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Capability {
    /// `CAP_CHOWN`
    Chown,
    /// `CAP_DAC_OVERRIDE`
    DacOverride,
    /// `CAP_FOWNER`
    FOwner,
    /// `CAP_KILL`
    Kill,
    /// `CAP_SETGID`
    SetGid,
    /// `CAP_SETUID`
    SetUid,
    /// `CAP_NET_BIND_SERVICE`
    NetBindService,
    /// `CAP_NET_RAW`
    NetRaw,
    /// `CAP_SYS_PTRACE`
    SysPtrace,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::Chown => "CHOWN",
            Capability::DacOverride => "DAC_OVERRIDE",
            Capability::FOwner => "FOWNER",
            Capability::Kill => "KILL",
            Capability::SetGid => "SETGID",
            Capability::SetUid => "SETUID",
            Capability::NetBindService => "NET_BIND_SERVICE",
            Capability::NetRaw => "NET_RAW",
            Capability::SysPtrace => "SYS_PTRACE",
        }
    }
}

/// Declarative security policy for a workload's containers.
///
/// - `drop_all_caps` clears every capability, then `keep_caps` are added back;
/// - `no_new_privs` forbids privilege escalation through setuid binaries or file capabilities;
/// - `run_as_non_root` refuses images that would run as uid 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityPosture {
    pub drop_all_caps: bool,
    /// Only meaningful when `drop_all_caps` is `true`.
    pub keep_caps: Vec<Capability>,
    pub no_new_privs: bool,
    pub run_as_non_root: bool,
}

impl SecurityPosture {
    /// Posture applied to every tenant workload.
    pub fn hardened() -> Self {
        Self {
            drop_all_caps: true,
            keep_caps: Vec::new(),
            no_new_privs: true,
            run_as_non_root: true,
        }
    }

    /// Returns `true` if no knob is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.drop_all_caps && self.keep_caps.is_empty() && !self.no_new_privs && !self.run_as_non_root
    }

    /// Capabilities to drop and to add, in substrate naming.
    pub fn capability_sets(&self) -> (Vec<&'static str>, Vec<&'static str>) {
        if !self.drop_all_caps {
            return (Vec::new(), Vec::new());
        }
        (vec!["ALL"], self.keep_caps.iter().map(|c| c.name()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardened_drops_everything() {
        let p = SecurityPosture::hardened();
        assert!(!p.is_empty());
        assert_eq!(p.capability_sets(), (vec!["ALL"], vec![]));
    }

    #[test]
    fn keep_caps_ignored_without_drop_all() {
        let p = SecurityPosture {
            keep_caps: vec![Capability::NetBindService],
            ..Default::default()
        };
        assert_eq!(p.capability_sets(), (vec![], vec![]));
        assert!(!p.is_empty());
    }

    #[test]
    fn allowlist_uses_substrate_names() {
        let p = SecurityPosture {
            keep_caps: vec![Capability::NetBindService, Capability::Chown],
            ..SecurityPosture::hardened()
        };
        assert_eq!(p.capability_sets().1, vec!["NET_BIND_SERVICE", "CHOWN"]);
    }
}

//! Capability sets and the one-time capability probe.

use std::{fmt, str::FromStr, sync::Arc};

use wrapplug_proto::ServiceKind;

use crate::{HmacComputer, InitFinalizer, Wrapper, WrapperError};

/// Which optional behaviors a wrapper exposes.
///
/// The two flags are orthogonal, so there are exactly four sets. The base
/// wrapping service is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilitySet {
    /// Wrapping only
    Base,
    /// Wrapping + HMAC
    Hmac,
    /// Wrapping + init/finalize
    InitFinalize,
    /// Wrapping + HMAC + init/finalize
    Full,
}

impl CapabilitySet {
    /// All four sets.
    pub const ALL: [Self; 4] = [Self::Base, Self::Hmac, Self::InitFinalize, Self::Full];

    /// Set from the two capability flags.
    pub const fn from_flags(hmac: bool, init_finalize: bool) -> Self {
        match (hmac, init_finalize) {
            (false, false) => Self::Base,
            (true, false) => Self::Hmac,
            (false, true) => Self::InitFinalize,
            (true, true) => Self::Full,
        }
    }

    /// Set from a list of registered services. Wrapping is implied.
    pub fn from_services(services: impl IntoIterator<Item = ServiceKind>) -> Self {
        let (mut hmac, mut init_finalize) = (false, false);
        for service in services {
            match service {
                ServiceKind::HmacComputer => hmac = true,
                ServiceKind::InitFinalize => init_finalize = true,
                ServiceKind::Wrapping => {},
            }
        }
        Self::from_flags(hmac, init_finalize)
    }

    /// Whether HMAC is exposed.
    pub const fn has_hmac(self) -> bool {
        matches!(self, Self::Hmac | Self::Full)
    }

    /// Whether init/finalize is exposed.
    pub const fn has_init_finalizer(self) -> bool {
        matches!(self, Self::InitFinalize | Self::Full)
    }

    /// Services to register, base first.
    pub fn services(self) -> Vec<ServiceKind> {
        let mut services = vec![ServiceKind::Wrapping];
        if self.has_hmac() {
            services.push(ServiceKind::HmacComputer);
        }
        if self.has_init_finalizer() {
            services.push(ServiceKind::InitFinalize);
        }
        services
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Hmac => "hmac",
            Self::InitFinalize => "init_finalize",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilitySet {
    type Err = WrapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|set| set.as_str() == s).ok_or_else(|| {
            WrapperError::invalid_parameter("capability.parse", format!("unknown set {s:?}"))
        })
    }
}

/// A wrapper with its optional capabilities resolved.
///
/// Built once by [`probe`]. Holders dispatch through the resolved trait
/// objects and never re-probe.
#[derive(Clone)]
pub struct ProbedWrapper {
    wrapper: Arc<dyn Wrapper>,
    hmac: Option<Arc<dyn HmacComputer>>,
    init_finalizer: Option<Arc<dyn InitFinalizer>>,
    capabilities: CapabilitySet,
}

impl ProbedWrapper {
    /// Base wrapper.
    pub fn wrapper(&self) -> &Arc<dyn Wrapper> {
        &self.wrapper
    }

    /// HMAC capability, if probed.
    pub fn hmac(&self) -> Option<&Arc<dyn HmacComputer>> {
        self.hmac.as_ref()
    }

    /// Init/finalize capability, if probed.
    pub fn init_finalizer(&self) -> Option<&Arc<dyn InitFinalizer>> {
        self.init_finalizer.as_ref()
    }

    /// Resolved capability set.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }
}

impl fmt::Debug for ProbedWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbedWrapper")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Resolve which optional capabilities `wrapper` supports.
///
/// # Errors
///
/// `Configuration` if no wrapper was supplied.
pub fn probe(wrapper: Option<Arc<dyn Wrapper>>) -> Result<ProbedWrapper, WrapperError> {
    let Some(wrapper) = wrapper else {
        return Err(WrapperError::configuration("capability.probe", "wrapper is nil"));
    };

    let hmac = Arc::clone(&wrapper).hmac_computer();
    let init_finalizer = Arc::clone(&wrapper).init_finalizer();
    let capabilities = CapabilitySet::from_flags(hmac.is_some(), init_finalizer.is_some());

    tracing::debug!(%capabilities, "probed wrapper capabilities");

    Ok(ProbedWrapper { wrapper, hmac, init_finalizer, capabilities })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestWrapper;

    #[test]
    fn flags_cover_all_four_sets() {
        assert_eq!(CapabilitySet::from_flags(false, false), CapabilitySet::Base);
        assert_eq!(CapabilitySet::from_flags(true, false), CapabilitySet::Hmac);
        assert_eq!(CapabilitySet::from_flags(false, true), CapabilitySet::InitFinalize);
        assert_eq!(CapabilitySet::from_flags(true, true), CapabilitySet::Full);
    }

    #[test]
    fn services_round_trip() {
        for set in CapabilitySet::ALL {
            assert_eq!(set.services()[0], ServiceKind::Wrapping);
            assert_eq!(CapabilitySet::from_services(set.services()), set);
        }
    }

    #[test]
    fn name_round_trip() {
        for set in CapabilitySet::ALL {
            assert_eq!(set.to_string().parse::<CapabilitySet>().unwrap(), set);
        }
        assert!("everything".parse::<CapabilitySet>().is_err());
    }

    #[test]
    fn probe_rejects_missing_wrapper() {
        let err = probe(None).unwrap_err();
        assert!(matches!(err, WrapperError::Configuration { .. }));
    }

    #[test]
    fn probe_matches_wrapper_capabilities() {
        for set in CapabilitySet::ALL {
            let wrapper = TestWrapper::new(b"secret").with_capabilities(set);
            let probed = probe(Some(Arc::new(wrapper))).unwrap();

            assert_eq!(probed.capabilities(), set);
            assert_eq!(probed.hmac().is_some(), set.has_hmac());
            assert_eq!(probed.init_finalizer().is_some(), set.has_init_finalizer());
        }
    }
}

use anyhow::{bail, Error, Result};

/// The service mesh whose sidecar and annotation conventions are recognized.
///
/// The flavor is fixed for the lifetime of the process.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MeshFlavor {
    #[default]
    Istio,
    Linkerd,
    Kuma,
}

// === impl MeshFlavor ===

impl MeshFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Istio => "istio",
            Self::Linkerd => "linkerd",
            Self::Kuma => "kuma",
        }
    }
}

impl std::str::FromStr for MeshFlavor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "istio" => Ok(Self::Istio),
            "linkerd" => Ok(Self::Linkerd),
            "kuma" => Ok(Self::Kuma),
            s => bail!("unsupported mesh mode {s:?}; expected one of istio, linkerd, kuma"),
        }
    }
}

impl std::fmt::Display for MeshFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

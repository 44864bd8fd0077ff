use crate::error::SimError;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::path::Path;

/// Fixup hook run after deserialization, e.g. to fill derived fields or
/// apply defaults that depend on other fields.
pub trait Init {
    fn init(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

/// Serialization/deserialization to the crate's supported text formats,
/// keyed by file extension.
pub trait SerdeAPI: Serialize + DeserializeOwned + Init {
    const ACCEPTED_FORMATS: &'static [&'static str] = &[
        #[cfg(feature = "yaml")]
        "yaml",
        #[cfg(feature = "json")]
        "json",
    ];

    fn to_file<P: AsRef<Path>>(&self, filepath: P) -> anyhow::Result<()> {
        let filepath = filepath.as_ref();
        let ext = extension_of(filepath)?;
        let file = File::create(filepath)?;
        match ext.as_str() {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => serde_yaml::to_writer(file, self)?,
            #[cfg(feature = "json")]
            "json" => serde_json::to_writer(file, self)?,
            _ => anyhow::bail!(
                "unsupported format {ext:?}, must be one of {:?}",
                Self::ACCEPTED_FORMATS
            ),
        }
        Ok(())
    }

    fn from_file<P: AsRef<Path>>(filepath: P) -> anyhow::Result<Self> {
        let filepath = filepath.as_ref();
        let ext = extension_of(filepath)?;
        let file = File::open(filepath)?;
        let mut out: Self = match ext.as_str() {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => serde_yaml::from_reader(file)?,
            #[cfg(feature = "json")]
            "json" => serde_json::from_reader(file)?,
            _ => anyhow::bail!(
                "unsupported format {ext:?}, must be one of {:?}",
                Self::ACCEPTED_FORMATS
            ),
        };
        out.init()?;
        Ok(out)
    }

    fn to_str(&self, format: &str) -> anyhow::Result<String> {
        match format {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(serde_yaml::to_string(self)?),
            #[cfg(feature = "json")]
            "json" => Ok(serde_json::to_string(self)?),
            _ => anyhow::bail!(
                "unsupported format {format:?}, must be one of {:?}",
                Self::ACCEPTED_FORMATS
            ),
        }
    }

    fn from_str(contents: &str, format: &str) -> anyhow::Result<Self> {
        let mut out: Self = match format {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => serde_yaml::from_str(contents)?,
            #[cfg(feature = "json")]
            "json" => serde_json::from_str(contents)?,
            _ => anyhow::bail!(
                "unsupported format {format:?}, must be one of {:?}",
                Self::ACCEPTED_FORMATS
            ),
        };
        out.init()?;
        Ok(out)
    }
}

fn extension_of(filepath: &Path) -> anyhow::Result<String> {
    Ok(filepath
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow::anyhow!("file {filepath:?} has no extension"))?
        .to_lowercase())
}

//! Patch serialization for save/load functionality.
//!
//! A patch captures the complete state of the component graph: every
//! component with its display name and parameter values, and every
//! connection. Loading a patch replays it as a sequence of [`Intent`]s, so it
//! goes through exactly the validation a live edit does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::parameter::{ParameterType, ParameterValue};
use crate::dsp::registry::{ComponentType, ModuleRegistry};
use crate::engine::commands::{ComponentId, Intent};
use crate::engine::connections::Connection;
use crate::engine::lifecycle::ControlSurfaceModel;

/// Current patch format version.
/// Increment this when making breaking changes to the format.
pub const PATCH_VERSION: u32 = 1;

/// A complete synthesizer patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Human-readable name for the patch.
    pub name: String,
    /// Patch format version for future compatibility.
    pub version: u32,
    pub components: Vec<ComponentData>,
    pub connections: Vec<Connection>,
}

impl Patch {
    /// Create a new empty patch with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: PATCH_VERSION,
            components: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Check if this patch version is compatible with the current format.
    pub fn is_compatible(&self) -> bool {
        self.version <= PATCH_VERSION
    }

    /// Builds a patch from control surface models and connections.
    pub fn capture<'a>(
        name: impl Into<String>,
        models: impl IntoIterator<Item = &'a ControlSurfaceModel>,
        connections: &[Connection],
    ) -> Self {
        Self {
            components: models.into_iter().map(ComponentData::from).collect(),
            connections: connections.to_vec(),
            ..Self::new(name)
        }
    }

    /// The intents that recreate this patch on an empty engine.
    ///
    /// Components first, then their controllable parameters, then the
    /// connections. Values of parameters that are only modulatable are
    /// derived state and are not replayed.
    pub fn intents(&self, registry: &ModuleRegistry) -> Vec<Intent> {
        let mut intents = Vec::with_capacity(self.components.len() * 4 + self.connections.len());

        for component in &self.components {
            intents.push(Intent::AddComponent {
                component_type: component.component_type,
                name: component.name.clone(),
                id: Some(component.id),
            });
        }

        for component in &self.components {
            let Ok(descriptor) = registry.describe(component.component_type) else {
                continue;
            };
            for (&parameter, &value) in &component.parameters {
                if descriptor.is_controllable(parameter) {
                    intents.push(Intent::SetParameter {
                        id: component.id,
                        parameter,
                        value,
                    });
                }
            }
        }

        for connection in &self.connections {
            intents.push(Intent::CreateConnection {
                outbound: connection.outbound,
                inbound: connection.inbound,
            });
        }
        intents
    }
}

impl Default for Patch {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Serialized data for a single component in the patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentData {
    /// Used for referencing in connections.
    pub id: ComponentId,
    pub component_type: ComponentType,
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<ParameterType, ParameterValue>,
}

impl From<&ControlSurfaceModel> for ComponentData {
    fn from(model: &ControlSurfaceModel) -> Self {
        Self {
            id: model.id,
            component_type: model.component_type,
            name: model.display_name.clone(),
            parameters: model.values.clone(),
        }
    }
}

/// Error type for patch operations.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("file error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("incompatible patch version: found {found}, expected <= {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
}

/// Save a patch to a JSON file.
pub fn save_to_file(patch: &Patch, path: &Path) -> Result<(), PatchError> {
    let json = serde_json::to_string_pretty(patch)?;
    std::fs::write(path, json).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a patch from a JSON file.
pub fn load_from_file(path: &Path) -> Result<Patch, PatchError> {
    let json = std::fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_json(&json)
}

/// Parse a patch and check its version.
pub fn from_json(json: &str) -> Result<Patch, PatchError> {
    let patch: Patch = serde_json::from_str(json)?;

    if !patch.is_compatible() {
        return Err(PatchError::IncompatibleVersion {
            found: patch.version,
            expected: PATCH_VERSION,
        });
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::port::{PortClass, Socket};
    use crate::dsp::registry::ModuleType;

    fn sample_patch() -> Patch {
        let mut patch = Patch::new("Test");
        patch.components.push(ComponentData {
            id: 1,
            component_type: ComponentType::Module(ModuleType::Oscillator),
            name: "osc".to_string(),
            parameters: BTreeMap::from([
                (ParameterType::Frequency, ParameterValue::Double(220.0)),
                (ParameterType::Amplitude, ParameterValue::Double(0.5)),
            ]),
        });
        patch.components.push(ComponentData {
            id: 2,
            component_type: ComponentType::Module(ModuleType::PolyOscillator),
            name: "poly".to_string(),
            // Gain is modulatable only on this type
            parameters: BTreeMap::from([(ParameterType::Gain, ParameterValue::Double(0.3))]),
        });
        patch.connections.push(Connection::new(
            Socket::new(1, 0, PortClass::AudioOut),
            Socket::new(3, 0, PortClass::AudioIn),
        ));
        patch
    }

    #[test]
    fn test_patch_creation() {
        let patch = Patch::new("Test Patch");
        assert_eq!(patch.name, "Test Patch");
        assert_eq!(patch.version, PATCH_VERSION);
        assert!(patch.components.is_empty());
        assert!(patch.connections.is_empty());
    }

    #[test]
    fn test_patch_serialization() {
        let patch = sample_patch();
        let json = serde_json::to_string(&patch).unwrap();
        assert!(json.contains(r#""FREQUENCY":220.0"#), "{json}");

        let loaded = from_json(&json).unwrap();
        assert_eq!(loaded, patch);
    }

    #[test]
    fn test_version_compatibility() {
        assert!(Patch::new("Test").is_compatible());

        let future = Patch {
            version: PATCH_VERSION + 1,
            ..Patch::new("Future")
        };
        assert!(!future.is_compatible());

        let json = serde_json::to_string(&future).unwrap();
        assert!(matches!(
            from_json(&json),
            Err(PatchError::IncompatibleVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_intents_order() {
        let patch = sample_patch();
        let intents = patch.intents(&ModuleRegistry::with_builtin());
        let names: Vec<_> = intents.iter().map(Intent::name).collect();
        assert_eq!(
            names,
            [
                "add_component",
                "add_component",
                "set_parameter",
                "set_parameter",
                "create_connection"
            ]
        );
        assert!(intents.iter().all(|i| !matches!(
            i,
            Intent::SetParameter {
                parameter: ParameterType::Gain,
                ..
            }
        )));
    }

    #[test]
    fn test_missing_file() {
        let err = load_from_file(Path::new("/no/such/patch.json")).unwrap_err();
        assert!(matches!(err, PatchError::Io { .. }));
    }
}

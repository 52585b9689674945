//! # `MnasNet` Model Prefabs
//!
//! Named, well-known [`MnasNetAbstractConfig`]s.
//!
//! ```rust,no_run
//! use burn::backend::NdArray;
//! use mnasnet::models::mnasnet::prefabs::lookup_prefab;
//! use mnasnet::models::mnasnet::MnasNet;
//!
//! let device = Default::default();
//! let prefab = lookup_prefab("mnasnet_a1").unwrap();
//! let model: MnasNet<NdArray> = prefab.new_config().to_structure().init(&device);
//! ```

use crate::models::mnasnet::MnasNetAbstractConfig;
use crate::utility::prefab::{StaticPreFabConfig, find_prefab};

/// Static builder for [`MnasNetAbstractConfig`].
pub type StaticMnasNetPreFabConfig = StaticPreFabConfig<MnasNetAbstractConfig>;

/// `MnasNet-A1`, width 0.5.
pub static MNASNET_A1_0_5: StaticMnasNetPreFabConfig = StaticMnasNetPreFabConfig {
    name: "mnasnet_a1_0_5",
    description: "MnasNet-A1, width multiplier 0.5, 1000 classes",
    builder: || MnasNetAbstractConfig::mnasnet_a1(0.5, 1000),
};

/// `MnasNet-A1`, width 0.75.
pub static MNASNET_A1_0_75: StaticMnasNetPreFabConfig = StaticMnasNetPreFabConfig {
    name: "mnasnet_a1_0_75",
    description: "MnasNet-A1, width multiplier 0.75, 1000 classes",
    builder: || MnasNetAbstractConfig::mnasnet_a1(0.75, 1000),
};

/// `MnasNet-A1`, width 1.0.
pub static MNASNET_A1: StaticMnasNetPreFabConfig = StaticMnasNetPreFabConfig {
    name: "mnasnet_a1",
    description: "MnasNet-A1, width multiplier 1.0, 1000 classes",
    builder: || MnasNetAbstractConfig::mnasnet_a1(1.0, 1000),
};

/// `MnasNet-A1`, width 1.4.
pub static MNASNET_A1_1_4: StaticMnasNetPreFabConfig = StaticMnasNetPreFabConfig {
    name: "mnasnet_a1_1_4",
    description: "MnasNet-A1, width multiplier 1.4, 1000 classes",
    builder: || MnasNetAbstractConfig::mnasnet_a1(1.4, 1000),
};

/// All known `MnasNet` prefabs.
pub static MNASNET_PREFABS: [&StaticMnasNetPreFabConfig; 4] =
    [&MNASNET_A1_0_5, &MNASNET_A1_0_75, &MNASNET_A1, &MNASNET_A1_1_4];

/// The names of all known `MnasNet` prefabs.
pub fn list_prefabs() -> Vec<&'static str> {
    MNASNET_PREFABS.iter().map(|prefab| prefab.name).collect()
}

/// Lookup a `MnasNet` prefab by name.
///
/// # Returns
///
/// `None` if the name is unknown.
pub fn lookup_prefab(name: &str) -> Option<&'static StaticMnasNetPreFabConfig> {
    find_prefab(&MNASNET_PREFABS, name)
}

//! Instrument discovery over a track's device tree

use crate::config::NativePluginConfig;
use crate::host::{Device, InstrumentDescriptor};

/// Depth-first search for the instrument the keyboard should control
///
/// Devices are visited in list order and racks are entered chain by chain; the
/// first instrument found wins. A rack is never reported itself, only what it
/// contains.
#[derive(Debug, Clone)]
pub struct InstrumentScanner {
    display_prefix: String,
    parameter_tag: String,
    plugin_classes: Vec<String>,
}

impl InstrumentScanner {
    pub fn new(native: &NativePluginConfig) -> Self {
        Self {
            display_prefix: native.display_prefix.clone(),
            parameter_tag: native.parameter_tag.clone(),
            plugin_classes: native.plugin_classes.clone(),
        }
    }

    /// First instrument in `devices`, `None` if there is none
    pub fn find_instrument(&self, devices: &[Device]) -> Option<InstrumentDescriptor> {
        devices.iter().find_map(|device| self.scan_device(device))
    }

    fn scan_device(&self, device: &Device) -> Option<InstrumentDescriptor> {
        if !device.is_instrument() {
            return None;
        }

        if device.can_have_chains {
            return device
                .chains
                .iter()
                .find_map(|chain| self.find_instrument(&chain.devices));
        }

        if self.is_native_plugin(device) {
            return Some(InstrumentDescriptor {
                display_name: device.display_name.clone(),
                instance_id: self.instance_id(device),
            });
        }

        Some(InstrumentDescriptor {
            display_name: device.display_name.clone(),
            instance_id: None,
        })
    }

    fn is_native_plugin(&self, device: &Device) -> bool {
        self.plugin_classes.iter().any(|c| *c == device.class_name)
            && device.display_name.starts_with(&self.display_prefix)
    }

    /// The second parameter of a native plugin is named `<tag><instance id>`
    fn instance_id(&self, device: &Device) -> Option<String> {
        device
            .parameters
            .get(1)
            .and_then(|p| p.name.strip_prefix(self.parameter_tag.as_str()))
            .map(str::to_string)
    }
}

impl Default for InstrumentScanner {
    fn default() -> Self {
        Self::new(&NativePluginConfig::default())
    }
}

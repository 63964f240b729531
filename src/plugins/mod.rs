//! Bundled plugins

pub mod intent;
pub mod mock_gesture;

pub use intent::IntentMapperPlugin;
pub use mock_gesture::MockGesturePlugin;

use crate::core::Plugin;

pub const BUILTIN: &[&str] = &[mock_gesture::NAME, intent::NAME];

/// Constructs a bundled plugin by name.
pub fn create(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        mock_gesture::NAME => Some(Box::new(MockGesturePlugin::new())),
        intent::NAME => Some(Box::new(IntentMapperPlugin::new())),
        _ => None,
    }
}

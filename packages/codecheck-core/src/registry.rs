//! Tool registry: where profiles get their tool descriptors from.

use crate::descriptor::ToolDescriptor;
use std::sync::Arc;

/// Produces every registered tool. Profiles instantiate each exactly once
/// during initialization.
pub trait ToolRegistry: Send + Sync {
    fn create_all(&self) -> Vec<Arc<ToolDescriptor>>;
}

/// A fixed, explicitly constructed registry. There is no ambient global
/// lookup; registries are built once and passed by reference.
#[derive(Default)]
pub struct StaticToolRegistry {
    tools: Vec<Arc<ToolDescriptor>>,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> &mut Self {
        self.tools.push(Arc::new(descriptor));
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn create_all(&self) -> Vec<Arc<ToolDescriptor>> {
        self.tools.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{LocalTool, ToolCapability};
    use crate::error::ToolResult;
    use crate::problem::ProblemDescriptor;
    use std::path::Path;

    struct NoopTool;

    impl LocalTool for NoopTool {
        fn check_file(
            &self,
            _file: &Path,
            _settings: &serde_json::Value,
            _batch: bool,
        ) -> ToolResult<Vec<ProblemDescriptor>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_static_registry() {
        let mut registry = StaticToolRegistry::new();
        registry.register(ToolDescriptor::new(
            "dead-code",
            ToolCapability::Local(Arc::new(NoopTool)),
        ));

        assert_eq!(registry.len(), 1);
        let created = registry.create_all();
        assert_eq!(created[0].id, "dead-code");
    }
}

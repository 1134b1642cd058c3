//! # Tavern Modules
//! Feature modules that ship with Tavern.

pub mod contest;

use tavern_kernel::ModuleDescriptor;

/// Every built-in module, in registration order.
pub fn builtin_modules() -> Vec<ModuleDescriptor> {
    vec![contest::contest_module()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_unique() {
        let modules = builtin_modules();
        let mut ids: Vec<_> = modules.iter().map(|m| m.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), modules.len());
    }
}

//! Qube model: an arena of qubes with index-based template/derived-vm
//! references.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QubeClass {
    AdminVm,
    TemplateVm,
    StandaloneVm,
    AppVm,
    DispVm,
}

/// Index into a [`QubeArena`]. Stable for the lifetime of one orchestrator
/// run; the arena is built once at startup and never mutated structurally.
pub type QubeId = usize;

#[derive(Debug, Clone)]
pub struct Qube {
    pub name: String,
    pub class: QubeClass,
    pub updateable: bool,
    pub template: Option<QubeId>,
    pub derived_vms: Vec<QubeId>,
    pub features: HashMap<String, String>,
    pub is_running: bool,
    pub auto_cleanup: bool,
    pub servicevm: bool,
}

impl Qube {
    pub fn feature(&self, key: &str) -> Option<&str> {
        self.features.get(key).map(String::as_str)
    }

    pub fn feature_bool(&self, key: &str) -> bool {
        self.feature(key)
            .map(|v| matches!(v, "1" | "true" | "True" | "yes"))
            .unwrap_or(false)
    }
}

/// Flat DTO used to populate the arena from [`crate::qube_api::QubesApi`],
/// before template/derived-vm references are resolved to ids.
#[derive(Debug, Clone)]
pub struct QubeRecord {
    pub name: String,
    pub class: QubeClass,
    pub updateable: bool,
    pub template_name: Option<String>,
    pub features: HashMap<String, String>,
    pub is_running: bool,
    pub auto_cleanup: bool,
    pub servicevm: bool,
}

#[derive(Debug, Default)]
pub struct QubeArena {
    qubes: Vec<Qube>,
    by_name: HashMap<String, QubeId>,
}

impl QubeArena {
    /// Build the arena from a flat record list, resolving template
    /// backreferences and populating each template's `derived_vms`.
    /// Invariant: `derived_vms` of template T contains every
    /// AppVM/DispVM whose template is T.
    pub fn build(records: Vec<QubeRecord>) -> Self {
        let by_name: HashMap<String, QubeId> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();

        let mut qubes: Vec<Qube> = records
            .into_iter()
            .map(|r| Qube {
                name: r.name,
                class: r.class,
                updateable: r.updateable,
                template: r.template_name.as_deref().and_then(|n| by_name.get(n).copied()),
                derived_vms: Vec::new(),
                features: r.features,
                is_running: r.is_running,
                auto_cleanup: r.auto_cleanup,
                servicevm: r.servicevm,
            })
            .collect();

        for id in 0..qubes.len() {
            if let Some(template_id) = qubes[id].template {
                qubes[template_id].derived_vms.push(id);
            }
        }

        Self { qubes, by_name }
    }

    pub fn get(&self, id: QubeId) -> &Qube {
        &self.qubes[id]
    }

    pub fn id_of(&self, name: &str) -> Option<QubeId> {
        self.by_name.get(name).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = QubeId> {
        0..self.qubes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QubeId, &Qube)> {
        self.qubes.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.qubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qubes.is_empty()
    }

    /// The value of `feature`, falling back to the qube's template's
    /// value when the qube has none of its own.
    pub fn inherited_feature(&self, id: QubeId, feature: &str) -> Option<&str> {
        let qube = self.get(id);
        qube.feature(feature).or_else(|| {
            qube.template.and_then(|t| self.get(t).feature(feature))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, class: QubeClass, template: Option<&str>) -> QubeRecord {
        QubeRecord {
            name: name.to_string(),
            class,
            updateable: true,
            template_name: template.map(str::to_string),
            features: HashMap::new(),
            is_running: false,
            auto_cleanup: false,
            servicevm: false,
        }
    }

    #[test]
    fn derived_vms_populated_from_template_backreference() {
        let arena = QubeArena::build(vec![
            record("tmpl", QubeClass::TemplateVm, None),
            record("app1", QubeClass::AppVm, Some("tmpl")),
            record("app2", QubeClass::AppVm, Some("tmpl")),
        ]);
        let tmpl_id = arena.id_of("tmpl").unwrap();
        let mut derived: Vec<&str> = arena
            .get(tmpl_id)
            .derived_vms
            .iter()
            .map(|&id| arena.get(id).name.as_str())
            .collect();
        derived.sort();
        assert_eq!(derived, vec!["app1", "app2"]);
    }

    #[test]
    fn feature_inherits_from_template_when_unset() {
        let mut tmpl = record("tmpl", QubeClass::TemplateVm, None);
        tmpl.features.insert("last-updates-check".into(), "2024-01-01".into());
        let arena = QubeArena::build(vec![tmpl, record("app1", QubeClass::AppVm, Some("tmpl"))]);
        let app_id = arena.id_of("app1").unwrap();
        assert_eq!(arena.inherited_feature(app_id, "last-updates-check"), Some("2024-01-01"));
    }

    #[test]
    fn own_feature_overrides_template() {
        let mut tmpl = record("tmpl", QubeClass::TemplateVm, None);
        tmpl.features.insert("last-updates-check".into(), "2024-01-01".into());
        let mut app = record("app1", QubeClass::AppVm, Some("tmpl"));
        app.features.insert("last-updates-check".into(), "2025-06-01".into());
        let arena = QubeArena::build(vec![tmpl, app]);
        let app_id = arena.id_of("app1").unwrap();
        assert_eq!(arena.inherited_feature(app_id, "last-updates-check"), Some("2025-06-01"));
    }
}

use super::*;

pub(crate) const PAGE_ATTR: &str = "data-page";
pub(crate) const LOGIN_HREF: &str = "login.html";
pub(crate) const UPDATE_PAGE: &str = "updateWebsite";

// Declared page identity -> the nav link target that must exist for it.
pub(crate) const PAGE_NAV_TARGETS: &[(&str, &str)] = &[
    ("home", "index.html"),
    ("templates", "templates.html"),
    ("assets", "assets.html"),
    ("updateWebsite", "update-website.html"),
    ("settings", "settings.html"),
];

pub(crate) fn expected_nav_target(page: &str) -> Option<&'static str> {
    PAGE_NAV_TARGETS
        .iter()
        .find(|(name, _)| *name == page)
        .map(|(_, target)| *target)
}

/// Final path segment of an href, query string and fragment stripped.
pub(crate) fn path_basename(href: &str) -> &str {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    let path = &href[..end];
    path.rsplit('/').next().unwrap_or(path)
}

/// The two-step rule shared by the checker and the nav highlighter:
/// exact string equality first, parsed-path basename equality second.
pub(crate) fn href_matches_target(href: &str, target: &str) -> bool {
    href == target || path_basename(href) == target
}

/// Outcome of the structural validation pass. Violations are collected
/// exhaustively and keep assertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    violations: Vec<String>,
}

impl IntegrityReport {
    pub fn ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<String> {
        self.violations
    }
}

pub(crate) fn run_integrity_check(dom: &Dom) -> IntegrityReport {
    let mut violations = Vec::new();

    let page = dom
        .root_element()
        .and_then(|root| dom.attr(root, PAGE_ATTR));
    if page.is_none() {
        violations.push(format!("missing {PAGE_ATTR} attribute on document root"));
    }

    let containers = dom.elements_with_attr("data-nav");
    let container = match containers.as_slice() {
        [single] => Some(*single),
        [] => {
            violations.push("missing [data-nav] navigation container".to_string());
            None
        }
        several => {
            violations.push(format!(
                "expected a single [data-nav] container, found {}",
                several.len()
            ));
            None
        }
    };

    if let Some(container) = container {
        let links: Vec<NodeId> = dom
            .descendant_elements(container)
            .into_iter()
            .filter(|node| dom.has_attr(*node, "data-nav-link"))
            .collect();
        if links.is_empty() {
            violations.push("[data-nav] container has no [data-nav-link] entries".to_string());
        }

        if let Some(target) = page.as_deref().and_then(expected_nav_target) {
            let matched = links.iter().any(|link| {
                dom.attr(*link, "href")
                    .is_some_and(|href| href_matches_target(&href, target))
            });
            if !links.is_empty() && !matched {
                violations.push(format!(
                    "no [data-nav-link] resolves to {target} for page {}",
                    page.as_deref().unwrap_or_default()
                ));
            }
        }
    }

    match dom.elements_with_attr("data-login-link").first() {
        None => violations.push("missing [data-login-link] element".to_string()),
        Some(login) => {
            let href = dom.attr(*login, "href").unwrap_or_default();
            if href != LOGIN_HREF {
                violations.push(format!(
                    "[data-login-link] href must be {LOGIN_HREF}, found {}",
                    if href.is_empty() { "none" } else { &href }
                ));
            }
        }
    }

    if page.as_deref() == Some(UPDATE_PAGE) && dom.elements_with_attr("data-dual-panel").is_empty()
    {
        violations.push(format!(
            "page {UPDATE_PAGE} requires a [data-dual-panel] container"
        ));
    }

    for trigger in dom.elements_with_attr("data-modal-target") {
        let target_id = dom.attr(trigger, "data-modal-target").unwrap_or_default();
        let controls = dom.attr(trigger, "aria-controls");
        if controls.as_deref() != Some(target_id.as_str()) {
            violations.push(format!(
                "modal trigger {} aria-controls must equal data-modal-target {target_id}",
                dom.describe(trigger)
            ));
        }
        if dom.element_by_id(&target_id).is_none() {
            violations.push(format!(
                "modal trigger {} targets missing element #{target_id}",
                dom.describe(trigger)
            ));
        }
    }

    for toggle in dom.elements_with_attr("data-toggle") {
        let role = dom.attr(toggle, "role").unwrap_or_default();
        if role != "switch" && role != "checkbox" {
            violations.push(format!(
                "toggle {} role must be switch or checkbox",
                dom.describe(toggle)
            ));
        }
        if !dom.has_attr(toggle, "aria-checked") {
            violations.push(format!(
                "toggle {} is missing the aria-checked attribute",
                dom.describe(toggle)
            ));
        }
    }

    IntegrityReport { violations }
}

use std::fmt;

use super::*;

/// Card subtype, decided once at bind time from class membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Section,
    Asset,
    Template,
    Generic,
}

impl CardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Asset => "asset",
            Self::Template => "template",
            Self::Generic => "card",
        }
    }
}

/// Everything the page broadcasts, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    LoadingStart {
        target: NodeId,
    },
    LoadingStop {
        target: NodeId,
    },
    IntegrityFail {
        errors: Vec<String>,
    },
    NavChanged {
        page: String,
    },
    ToggleChange {
        name: Option<String>,
        checked: bool,
        element: NodeId,
    },
    CardSelect {
        id: Option<String>,
        kind: CardKind,
        selected: bool,
        element: NodeId,
    },
    ModalOpen {
        id: String,
        element: NodeId,
        trigger: NodeId,
    },
    ModalClose {
        id: String,
        element: NodeId,
    },
    GenerateComplete {
        element: NodeId,
    },
    RegenerateStart {
        element: NodeId,
    },
    RegenerateComplete {
        element: NodeId,
    },
    UploadTrigger {
        element: NodeId,
    },
    StyleChange {
        value: String,
    },
    AppInitialized,
}

impl PageEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadingStart { .. } => "loading:start",
            Self::LoadingStop { .. } => "loading:stop",
            Self::IntegrityFail { .. } => "integrity:fail",
            Self::NavChanged { .. } => "nav:changed",
            Self::ToggleChange { .. } => "toggle:change",
            Self::CardSelect { .. } => "card:select",
            Self::ModalOpen { .. } => "modal:open",
            Self::ModalClose { .. } => "modal:close",
            Self::GenerateComplete { .. } => "generate:complete",
            Self::RegenerateStart { .. } => "regenerate:start",
            Self::RegenerateComplete { .. } => "regenerate:complete",
            Self::UploadTrigger { .. } => "upload:trigger",
            Self::StyleChange { .. } => "style:change",
            Self::AppInitialized => "app:initialized",
        }
    }
}

impl fmt::Display for PageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            Self::LoadingStart { target } | Self::LoadingStop { target } => {
                write!(f, " target={}", target.0)
            }
            Self::IntegrityFail { errors } => write!(f, " errors={}", errors.len()),
            Self::NavChanged { page } => write!(f, " page={page}"),
            Self::ToggleChange { name, checked, .. } => {
                write!(f, " name={} checked={checked}", name.as_deref().unwrap_or("-"))
            }
            Self::CardSelect {
                id, kind, selected, ..
            } => write!(
                f,
                " id={} kind={} selected={selected}",
                id.as_deref().unwrap_or("-"),
                kind.as_str()
            ),
            Self::ModalOpen { id, .. } | Self::ModalClose { id, .. } => write!(f, " id={id}"),
            Self::GenerateComplete { element }
            | Self::RegenerateStart { element }
            | Self::RegenerateComplete { element }
            | Self::UploadTrigger { element } => write!(f, " element={}", element.0),
            Self::StyleChange { value } => write!(f, " value={value}"),
            Self::AppInitialized => Ok(()),
        }
    }
}

/// Page-lifetime publish mechanism. Emission appends to an ordered log the
/// embedder drains; binders receive the bus as an explicit capability.
#[derive(Debug, Default, Clone)]
pub(crate) struct EventBus {
    records: Vec<PageEvent>,
}

impl EventBus {
    pub(crate) fn emit(&mut self, event: PageEvent) {
        self.records.push(event);
    }

    pub(crate) fn records(&self) -> &[PageEvent] {
        &self.records
    }

    pub(crate) fn take(&mut self) -> Vec<PageEvent> {
        std::mem::take(&mut self.records)
    }
}

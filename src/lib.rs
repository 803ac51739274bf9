use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    SelectorNotFound(String),
    UnsupportedSelector(String),
    Runtime(String),
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {selector}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::Runtime(msg) => write!(f, "runtime error: {msg}"),
            Self::AssertionFailed {
                selector,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
        }
    }
}

impl StdError for Error {}

mod binders;
mod dom;
mod engine;
mod events;
mod html;
mod integrity;
mod selector;

pub use dom::NodeId;
pub use engine::{Page, PendingTimer};
pub use events::{CardKind, PageEvent};
pub use integrity::IntegrityReport;

pub(crate) use dom::*;
pub(crate) use engine::*;
pub(crate) use events::*;
pub(crate) use html::*;
pub(crate) use integrity::*;
pub(crate) use selector::*;

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PAGE: &str = r#"
    <html data-page='home'>
      <body>
        <nav data-nav>
          <a data-nav-link href='index.html'>Home</a>
          <a data-nav-link href='/site/templates.html'>Templates</a>
        </nav>
        <a data-login-link href='login.html'>Log in</a>

        <div data-toggle id='autosave' role='switch' aria-checked='false'>Autosave</div>
        <div data-toggle data-name='darkMode' role='checkbox' aria-checked='true'>Dark mode</div>

        <div class='section-card' id='hero'>Hero</div>
        <div class='section-card' id='gallery'>Gallery</div>
        <div class='section-card' id='contact'>Contact</div>
        <div class='asset-card' id='logo'>Logo</div>
        <div data-card id='misc'>Misc</div>

        <button data-modal-target='previewModal' aria-controls='previewModal' id='openPreview'>Preview</button>
        <div data-modal id='previewModal' aria-hidden='true'>
          <div data-modal-backdrop id='previewBackdrop'></div>
          <button data-modal-close id='previewClose'>Close</button>
        </div>

        <button data-action='generate' id='generate'>Generate</button>
        <button data-action='regenerate' id='regenerate'>Regenerate</button>
        <button data-upload-trigger id='upload'>Upload</button>

        <select id='style-selector'>
          <option value='classic'>Classic</option>
        </select>
      </body>
    </html>
    "#;

    fn initialized_page() -> Result<Page> {
        let mut page = Page::from_html(VALID_PAGE)?;
        assert!(page.initialize()?);
        page.take_events();
        Ok(page)
    }

    #[test]
    fn initialize_on_valid_page_emits_initialized() -> Result<()> {
        let mut page = Page::from_html(VALID_PAGE)?;
        assert!(page.initialize()?);
        let events = page.take_events();
        assert!(matches!(events.first(), Some(PageEvent::NavChanged { .. })));
        assert!(matches!(events.last(), Some(PageEvent::AppInitialized)));
        Ok(())
    }

    #[test]
    fn initialize_is_fail_closed_on_broken_page() -> Result<()> {
        let html = "<html><body><button data-action='generate' id='go'>Go</button></body></html>";
        let mut page = Page::from_html(html)?;
        assert!(!page.initialize()?);

        let events = page.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PageEvent::IntegrityFail { .. }));

        // No binder attached: clicking the action does nothing.
        page.click("#go")?;
        assert!(page.take_events().is_empty());
        assert_eq!(page.pending_timers().len(), 0);
        Ok(())
    }

    #[test]
    fn toggle_click_flips_state_and_reports_name() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#autosave")?;
        page.assert_attr("#autosave", "aria-checked", "true")?;
        page.assert_has_class("#autosave", "is-checked")?;
        let events = page.take_events();
        match &events[..] {
            [PageEvent::ToggleChange { name, checked, .. }] => {
                assert_eq!(name.as_deref(), Some("autosave"));
                assert!(*checked);
            }
            other => panic!("unexpected events: {other:?}"),
        }

        page.click("#autosave")?;
        page.assert_attr("#autosave", "aria-checked", "false")?;
        Ok(())
    }

    #[test]
    fn toggle_prefers_declared_name_over_id() -> Result<()> {
        let mut page = initialized_page()?;
        page.click("[data-name=darkMode]")?;
        match &page.take_events()[..] {
            [PageEvent::ToggleChange { name, checked, .. }] => {
                assert_eq!(name.as_deref(), Some("darkMode"));
                // Was checked in markup, so the flip turns it off.
                assert!(!*checked);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn toggle_responds_to_enter_and_space() -> Result<()> {
        let mut page = initialized_page()?;
        page.press_key("#autosave", "Enter")?;
        page.assert_attr("#autosave", "aria-checked", "true")?;
        page.press_key("#autosave", " ")?;
        page.assert_attr("#autosave", "aria-checked", "false")?;
        page.press_key("#autosave", "x")?;
        page.assert_attr("#autosave", "aria-checked", "false")?;
        Ok(())
    }

    #[test]
    fn section_cards_are_mutually_exclusive() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#hero")?;
        page.assert_has_class("#hero", "is-selected")?;
        page.click("#gallery")?;
        page.assert_has_class("#gallery", "is-selected")?;
        assert!(!page.has_class("#hero", "is-selected")?);
        page.assert_attr("#hero", "aria-pressed", "false")?;
        page.assert_attr("#gallery", "aria-pressed", "true")?;

        assert_eq!(page.query_all(".section-card.is-selected")?.len(), 1);
        Ok(())
    }

    #[test]
    fn non_section_card_toggle_is_an_involution() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#logo")?;
        page.assert_has_class("#logo", "is-selected")?;
        page.click("#logo")?;
        assert!(!page.has_class("#logo", "is-selected")?);

        let events = page.take_events();
        match &events[..] {
            [
                PageEvent::CardSelect {
                    kind: CardKind::Asset,
                    selected: true,
                    ..
                },
                PageEvent::CardSelect {
                    kind: CardKind::Asset,
                    selected: false,
                    ..
                },
            ] => {}
            other => panic!("unexpected events: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn generic_card_selection_does_not_touch_sections() -> Result<()> {
        let mut page = initialized_page()?;
        page.click("#hero")?;
        page.click("#misc")?;
        page.assert_has_class("#hero", "is-selected")?;
        page.assert_has_class("#misc", "is-selected")?;
        Ok(())
    }

    #[test]
    fn modal_opens_with_dialog_role_and_scroll_lock() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#openPreview")?;
        page.assert_has_class("#previewModal", "is-open")?;
        page.assert_attr("#previewModal", "aria-hidden", "false")?;
        page.assert_attr("#previewModal", "role", "dialog")?;
        page.assert_has_class("html", "no-scroll")?;
        assert_eq!(page.focused(), Some(page.node_id("#previewClose")?));

        match &page.take_events()[..] {
            [PageEvent::ModalOpen { id, .. }] => assert_eq!(id, "previewModal"),
            other => panic!("unexpected events: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn modal_close_control_and_backdrop_both_close() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#openPreview")?;
        page.click("#previewClose")?;
        assert!(!page.has_class("#previewModal", "is-open")?);
        page.assert_attr("#previewModal", "aria-hidden", "true")?;
        assert!(!page.has_class("html", "no-scroll")?);

        page.click("#openPreview")?;
        page.click("#previewBackdrop")?;
        assert!(!page.has_class("#previewModal", "is-open")?);
        Ok(())
    }

    #[test]
    fn existing_role_attribute_is_left_alone() -> Result<()> {
        let html = VALID_PAGE.replace(
            "<div data-modal id='previewModal' aria-hidden='true'>",
            "<div data-modal id='previewModal' role='alertdialog' aria-hidden='true'>",
        );
        let mut page = Page::from_html(&html)?;
        assert!(page.initialize()?);
        page.click("#openPreview")?;
        page.assert_attr("#previewModal", "role", "alertdialog")?;
        Ok(())
    }

    #[test]
    fn escape_closes_every_open_modal_at_once() -> Result<()> {
        let html = VALID_PAGE.replace(
            "<button data-action='generate' id='generate'>Generate</button>",
            concat!(
                "<button data-modal-target='helpModal' aria-controls='helpModal' id='openHelp'>?</button>",
                "<div data-modal id='helpModal' aria-hidden='true'></div>",
                "<button data-action='generate' id='generate'>Generate</button>",
            ),
        );
        let mut page = Page::from_html(&html)?;
        assert!(page.initialize()?);
        page.click("#openPreview")?;
        page.click("#openHelp")?;
        page.take_events();

        page.press_escape()?;
        assert!(!page.has_class("#previewModal", "is-open")?);
        assert!(!page.has_class("#helpModal", "is-open")?);
        let closes = page
            .take_events()
            .into_iter()
            .filter(|event| matches!(event, PageEvent::ModalClose { .. }))
            .count();
        assert_eq!(closes, 2);
        Ok(())
    }

    #[test]
    fn generate_runs_busy_cycle_on_the_virtual_clock() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#generate")?;
        page.assert_has_class("#generate", "is-loading")?;
        page.assert_attr("#generate", "aria-busy", "true")?;
        page.assert_text("#generate", "Generating...")?;
        assert_eq!(page.pending_timers().len(), 1);

        page.advance_time(2499)?;
        page.assert_has_class("#generate", "is-loading")?;
        page.advance_time(1)?;
        assert!(!page.has_class("#generate", "is-loading")?);
        page.assert_attr("#generate", "aria-busy", "false")?;
        page.assert_text("#generate", "Generate")?;

        let events = page.take_events();
        let names: Vec<_> = events.iter().map(PageEvent::name).collect();
        assert_eq!(names, ["loading:start", "loading:stop", "generate:complete"]);
        Ok(())
    }

    #[test]
    fn busy_element_ignores_reentrant_activation() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#generate")?;
        page.click("#generate")?;
        assert_eq!(page.pending_timers().len(), 1);
        let starts = page
            .take_events()
            .into_iter()
            .filter(|event| matches!(event, PageEvent::LoadingStart { .. }))
            .count();
        assert_eq!(starts, 1);
        Ok(())
    }

    #[test]
    fn regenerate_and_upload_emit_their_subtype_events() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#regenerate")?;
        page.advance_time(500)?;
        page.click("#upload")?;
        page.advance_time(150)?;

        let names: Vec<_> = page.take_events().iter().map(PageEvent::name).collect();
        assert_eq!(
            names,
            [
                "loading:start",
                "regenerate:start",
                "loading:stop",
                "regenerate:complete",
                "loading:start",
                "upload:trigger",
                "loading:stop",
            ]
        );
        Ok(())
    }

    #[test]
    fn clear_loading_cancels_the_pending_task() -> Result<()> {
        let mut page = initialized_page()?;

        page.click("#generate")?;
        page.take_events();
        page.clear_loading("#generate")?;
        assert!(!page.has_class("#generate", "is-loading")?);
        page.assert_text("#generate", "Generate")?;
        assert_eq!(page.pending_timers().len(), 0);

        let names: Vec<_> = page.take_events().iter().map(PageEvent::name).collect();
        assert_eq!(names, ["loading:stop"]);

        // The canceled task never fires.
        page.advance_time(10_000)?;
        assert!(page.take_events().is_empty());
        Ok(())
    }

    #[test]
    fn nav_highlighting_is_idempotent() -> Result<()> {
        let mut page = initialized_page()?;
        page.assert_has_class("[href='index.html']", "is-active")?;
        page.assert_attr("[href='index.html']", "aria-current", "page")?;
        assert!(!page.has_class("[href='/site/templates.html']", "is-active")?);

        page.rebind_nav()?;
        page.assert_has_class("[href='index.html']", "is-active")?;
        assert_eq!(page.query_all("[aria-current]")?.len(), 1);

        match &page.take_events()[..] {
            [PageEvent::NavChanged { page: value }] => assert_eq!(value, "index.html"),
            other => panic!("unexpected events: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn nav_matches_by_path_basename() -> Result<()> {
        let html = VALID_PAGE.replace("data-page='home'", "data-page='templates'");
        let mut page = Page::from_html(&html)?;
        assert!(page.initialize()?);
        page.assert_has_class("[href='/site/templates.html']", "is-active")?;
        assert!(!page.has_class("[href='index.html']", "is-active")?);
        Ok(())
    }

    #[test]
    fn rebinding_does_not_duplicate_behaviors() -> Result<()> {
        let mut page = initialized_page()?;
        page.rebind_toggles()?;
        page.rebind_cards()?;
        page.rebind_modals()?;
        page.take_events();

        page.click("#autosave")?;
        assert_eq!(page.take_events().len(), 1);
        page.click("#hero")?;
        assert_eq!(page.take_events().len(), 1);
        Ok(())
    }

    #[test]
    fn granular_rebind_bypasses_the_integrity_gate() -> Result<()> {
        let html = "<html><body>\
             <div data-toggle id='t1' role='switch' aria-checked='false'>T</div>\
             </body></html>";
        let mut page = Page::from_html(html)?;
        assert!(!page.initialize()?);
        page.take_events();

        page.rebind_toggles()?;
        page.click("#t1")?;
        page.assert_attr("#t1", "aria-checked", "true")?;
        Ok(())
    }

    #[test]
    fn style_selector_change_emits_value() -> Result<()> {
        let mut page = initialized_page()?;
        page.change_value("#style-selector", "minimal")?;
        match &page.take_events()[..] {
            [PageEvent::StyleChange { value }] => assert_eq!(value, "minimal"),
            other => panic!("unexpected events: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn activation_bubbles_from_descendants() -> Result<()> {
        let html = VALID_PAGE.replace(
            "<div class='section-card' id='hero'>Hero</div>",
            "<div class='section-card' id='hero'><span id='heroLabel'>Hero</span></div>",
        );
        let mut page = Page::from_html(&html)?;
        assert!(page.initialize()?);
        page.take_events();

        page.click("#heroLabel")?;
        page.assert_has_class("#hero", "is-selected")?;
        Ok(())
    }

    #[test]
    fn trace_log_records_events_and_timers() -> Result<()> {
        let mut page = initialized_page()?;
        page.enable_trace(true);
        page.set_trace_stderr(false);
        page.click("#generate")?;
        page.advance_time(2500)?;

        let logs = page.take_trace_logs();
        assert!(
            logs.iter()
                .any(|line| line.starts_with("[event] loading:start"))
        );
        assert!(logs.iter().any(|line| line.starts_with("[timer]")));
        Ok(())
    }
}

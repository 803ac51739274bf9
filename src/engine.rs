use std::collections::HashMap;

use super::*;

pub(crate) const ACTIVE_CLASS: &str = "is-active";
pub(crate) const CHECKED_CLASS: &str = "is-checked";
pub(crate) const SELECTED_CLASS: &str = "is-selected";
pub(crate) const OPEN_CLASS: &str = "is-open";
pub(crate) const BUSY_CLASS: &str = "is-loading";
pub(crate) const SCROLL_LOCK_CLASS: &str = "no-scroll";
pub(crate) const GENERATE_BUSY_LABEL: &str = "Generating...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EventKind {
    Click,
    Keydown,
    Change,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Keydown => "keydown",
            Self::Change => "change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadingAction {
    Generate,
    Regenerate,
    Upload,
}

impl LoadingAction {
    pub(crate) fn delay_ms(&self) -> i64 {
        match self {
            Self::Generate => 2_500,
            Self::Regenerate => 500,
            Self::Upload => 150,
        }
    }

    fn busy_label(&self) -> Option<&'static str> {
        match self {
            Self::Generate => Some(GENERATE_BUSY_LABEL),
            _ => None,
        }
    }
}

/// One attached behavior. Elements are classified into these variants at
/// bind time; dispatch never re-tests class membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    ToggleSwitch,
    SelectCard(CardKind),
    OpenModal { modal: NodeId },
    CloseModal { modal: NodeId },
    CloseModalBackdrop { modal: NodeId },
    EscapeCloseModals,
    StartLoading(LoadingAction),
    EmitStyleChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) on: EventKind,
    pub(crate) behavior: Behavior,
}

/// Bound handlers per element. Adding an identical binding twice is a no-op,
/// which is what makes every binder idempotently re-runnable.
#[derive(Debug, Default, Clone)]
pub(crate) struct BindingStore {
    map: HashMap<NodeId, Vec<Binding>>,
}

impl BindingStore {
    pub(crate) fn add(&mut self, node_id: NodeId, binding: Binding) {
        let bindings = self.map.entry(node_id).or_default();
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
    }

    fn matching(&self, node_id: NodeId, kind: EventKind) -> Vec<Behavior> {
        self.map
            .get(&node_id)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter(|binding| binding.on == kind)
                    .map(|binding| binding.behavior)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
enum TaskKind {
    FinishLoading {
        node: NodeId,
        action: LoadingAction,
        restore_label: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    id: i64,
    due_at: i64,
    order: i64,
    kind: TaskKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: i64,
    pub due_at: i64,
    pub order: i64,
}

pub struct Page {
    pub(crate) dom: Dom,
    pub(crate) bindings: BindingStore,
    pub(crate) bus: EventBus,
    task_queue: Vec<ScheduledTask>,
    focused: Option<NodeId>,
    now_ms: i64,
    next_timer_id: i64,
    next_task_order: i64,
    trace: bool,
    trace_logs: Vec<String>,
    trace_log_limit: usize,
    trace_to_stderr: bool,
}

impl Page {
    pub fn from_html(html: &str) -> Result<Self> {
        let dom = parse_html(html)?;
        Ok(Self {
            dom,
            bindings: BindingStore::default(),
            bus: EventBus::default(),
            task_queue: Vec::new(),
            focused: None,
            now_ms: 0,
            next_timer_id: 1,
            next_task_order: 0,
            trace: false,
            trace_logs: Vec::new(),
            trace_log_limit: 10_000,
            trace_to_stderr: true,
        })
    }

    // ----- trace facility -----

    pub fn enable_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.trace_to_stderr = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Runtime(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.trace_log_limit = max_entries;
        while self.trace_logs.len() > self.trace_log_limit {
            self.trace_logs.remove(0);
        }
        Ok(())
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace_logs)
    }

    fn trace_line(&mut self, line: String) {
        if !self.trace {
            return;
        }
        if self.trace_to_stderr {
            eprintln!("{line}");
        }
        self.trace_logs.push(line);
        while self.trace_logs.len() > self.trace_log_limit {
            self.trace_logs.remove(0);
        }
    }

    // ----- event log -----

    pub(crate) fn emit(&mut self, event: PageEvent) {
        self.trace_line(format!("[event] {event}"));
        self.bus.emit(event);
    }

    pub fn events(&self) -> &[PageEvent] {
        self.bus.records()
    }

    pub fn take_events(&mut self) -> Vec<PageEvent> {
        self.bus.take()
    }

    // ----- element lookup -----

    pub(crate) fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.into()))
    }

    pub fn node_id(&self, selector: &str) -> Result<NodeId> {
        self.select_one(selector)
    }

    pub fn query_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.dom.query_selector_all(selector)
    }

    pub fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let node = self.select_one(selector)?;
        Ok(self.dom.attr(node, name))
    }

    pub fn has_class(&self, selector: &str, class_name: &str) -> Result<bool> {
        let node = self.select_one(selector)?;
        Ok(self.dom.has_class(node, class_name))
    }

    pub fn text(&self, selector: &str) -> Result<String> {
        let node = self.select_one(selector)?;
        Ok(self.dom.text_content(node))
    }

    /// Element that last received a synthetic focus move (modal opening).
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub(crate) fn set_focus(&mut self, node: NodeId) {
        self.focused = Some(node);
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let node = self.select_one(selector)?;
        Ok(self.dom.dump(node))
    }

    // ----- synthetic input -----

    pub fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dispatch(target, EventKind::Click, None)
    }

    pub fn press_key(&mut self, selector: &str, key: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dispatch(target, EventKind::Keydown, Some(key))
    }

    /// Keydown on the document root, where the all-modals Escape handler
    /// lives.
    pub fn press_escape(&mut self) -> Result<()> {
        let Some(root) = self.dom.root_element() else {
            return Ok(());
        };
        self.dispatch(root, EventKind::Keydown, Some("Escape"))
    }

    /// Writes the control's value, then fires its change handlers.
    pub fn change_value(&mut self, selector: &str, value: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dom.set_attr(target, "value", value)?;
        self.dispatch(target, EventKind::Change, None)
    }

    fn dispatch(&mut self, target: NodeId, kind: EventKind, key: Option<&str>) -> Result<()> {
        self.trace_line(format!(
            "[input] {} target={} key={}",
            kind.as_str(),
            target.0,
            key.unwrap_or("-")
        ));

        // Target first, then bubble through ancestors; behaviors run with
        // the element they were bound on.
        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.dom.parent(node);
        }

        let mut pending = Vec::new();
        for node in &path {
            for behavior in self.bindings.matching(*node, kind) {
                pending.push((*node, behavior));
            }
        }
        for (owner, behavior) in pending {
            self.run_behavior(owner, target, behavior, key)?;
        }
        Ok(())
    }

    // ----- behavior execution -----

    fn run_behavior(
        &mut self,
        owner: NodeId,
        target: NodeId,
        behavior: Behavior,
        key: Option<&str>,
    ) -> Result<()> {
        match behavior {
            Behavior::ToggleSwitch => {
                if activation_suppressed(key) {
                    return Ok(());
                }
                self.flip_toggle(owner)
            }
            Behavior::SelectCard(kind) => {
                if activation_suppressed(key) {
                    return Ok(());
                }
                self.select_card(owner, kind)
            }
            Behavior::OpenModal { modal } => self.open_modal(modal, owner),
            Behavior::CloseModal { modal } => self.close_modal(modal),
            Behavior::CloseModalBackdrop { modal } => {
                // Only direct hits on the backdrop region close the modal.
                if target != owner {
                    return Ok(());
                }
                self.close_modal(modal)
            }
            Behavior::EscapeCloseModals => {
                if key != Some("Escape") {
                    return Ok(());
                }
                self.close_open_modals()
            }
            Behavior::StartLoading(action) => {
                if activation_suppressed(key) {
                    return Ok(());
                }
                self.start_loading(owner, action)
            }
            Behavior::EmitStyleChange => {
                let value = self.dom.attr(owner, "value").unwrap_or_default();
                self.emit(PageEvent::StyleChange { value });
                Ok(())
            }
        }
    }

    fn flip_toggle(&mut self, node: NodeId) -> Result<()> {
        let checked = self.dom.attr(node, "aria-checked").as_deref() == Some("true");
        let next = !checked;
        self.dom
            .set_attr(node, "aria-checked", if next { "true" } else { "false" })?;
        if next {
            self.dom.add_class(node, CHECKED_CLASS);
        } else {
            self.dom.remove_class(node, CHECKED_CLASS);
        }
        let name = self
            .dom
            .attr(node, "data-name")
            .or_else(|| self.dom.attr(node, "id"));
        self.emit(PageEvent::ToggleChange {
            name,
            checked: next,
            element: node,
        });
        Ok(())
    }

    fn select_card(&mut self, node: NodeId, kind: CardKind) -> Result<()> {
        let selected = match kind {
            CardKind::Section => {
                // Section cards are single-select across the whole document;
                // the scan runs at event time so injected cards participate.
                for card in self.dom.elements_with_class("section-card") {
                    self.dom.remove_class(card, SELECTED_CLASS);
                    self.dom.set_attr(card, "aria-pressed", "false")?;
                }
                self.dom.add_class(node, SELECTED_CLASS);
                self.dom.set_attr(node, "aria-pressed", "true")?;
                true
            }
            _ => {
                let next = !self.dom.has_class(node, SELECTED_CLASS);
                if next {
                    self.dom.add_class(node, SELECTED_CLASS);
                } else {
                    self.dom.remove_class(node, SELECTED_CLASS);
                }
                self.dom
                    .set_attr(node, "aria-pressed", if next { "true" } else { "false" })?;
                next
            }
        };
        self.emit(PageEvent::CardSelect {
            id: self.dom.attr(node, "id"),
            kind,
            selected,
            element: node,
        });
        Ok(())
    }

    fn open_modal(&mut self, modal: NodeId, trigger: NodeId) -> Result<()> {
        if self.dom.has_class(modal, OPEN_CLASS) {
            return Ok(());
        }
        self.dom.add_class(modal, OPEN_CLASS);
        self.dom.set_attr(modal, "aria-hidden", "false")?;
        if self.dom.attr(modal, "role").is_none() {
            self.dom.set_attr(modal, "role", "dialog")?;
        }
        if let Some(root) = self.dom.root_element() {
            self.dom.add_class(root, SCROLL_LOCK_CLASS);
        }

        let focus_target = self
            .dom
            .descendant_elements(modal)
            .into_iter()
            .find(|node| self.dom.has_attr(*node, "data-modal-close"))
            .unwrap_or(modal);
        self.set_focus(focus_target);

        let id = self.dom.attr(modal, "id").unwrap_or_default();
        self.emit(PageEvent::ModalOpen {
            id,
            element: modal,
            trigger,
        });
        Ok(())
    }

    fn close_modal(&mut self, modal: NodeId) -> Result<()> {
        if !self.dom.has_class(modal, OPEN_CLASS) {
            return Ok(());
        }
        self.dom.remove_class(modal, OPEN_CLASS);
        self.dom.set_attr(modal, "aria-hidden", "true")?;
        if let Some(root) = self.dom.root_element() {
            self.dom.remove_class(root, SCROLL_LOCK_CLASS);
        }
        let id = self.dom.attr(modal, "id").unwrap_or_default();
        self.emit(PageEvent::ModalClose { id, element: modal });
        Ok(())
    }

    fn close_open_modals(&mut self) -> Result<()> {
        for modal in self.dom.elements_with_attr("data-modal") {
            if self.dom.has_class(modal, OPEN_CLASS) {
                self.close_modal(modal)?;
            }
        }
        Ok(())
    }

    fn is_busy(&self, node: NodeId) -> bool {
        self.dom.attr(node, "aria-busy").as_deref() == Some("true")
            || self.dom.has_class(node, BUSY_CLASS)
    }

    fn start_loading(&mut self, node: NodeId, action: LoadingAction) -> Result<()> {
        // Re-entry guard: a second activation while busy is a no-op, which
        // substitutes for cancellation of the synthetic delay.
        if self.is_busy(node) {
            return Ok(());
        }

        self.dom.add_class(node, BUSY_CLASS);
        self.dom.set_attr(node, "aria-busy", "true")?;
        self.emit(PageEvent::LoadingStart { target: node });

        let restore_label = match action.busy_label() {
            Some(busy) => {
                let prior = self.dom.text_content(node);
                self.dom.set_text(node, busy);
                Some(prior)
            }
            None => None,
        };

        match action {
            LoadingAction::Regenerate => self.emit(PageEvent::RegenerateStart { element: node }),
            LoadingAction::Upload => self.emit(PageEvent::UploadTrigger { element: node }),
            LoadingAction::Generate => {}
        }

        self.schedule(
            action.delay_ms(),
            TaskKind::FinishLoading {
                node,
                action,
                restore_label,
            },
        );
        Ok(())
    }

    fn revert_busy(&mut self, node: NodeId, restore_label: Option<String>) -> Result<()> {
        self.dom.remove_class(node, BUSY_CLASS);
        self.dom.set_attr(node, "aria-busy", "false")?;
        if let Some(label) = restore_label {
            self.dom.set_text(node, &label);
        }
        self.emit(PageEvent::LoadingStop { target: node });
        Ok(())
    }

    fn finish_loading(
        &mut self,
        node: NodeId,
        action: LoadingAction,
        restore_label: Option<String>,
    ) -> Result<()> {
        self.revert_busy(node, restore_label)?;
        match action {
            LoadingAction::Generate => self.emit(PageEvent::GenerateComplete { element: node }),
            LoadingAction::Regenerate => {
                self.emit(PageEvent::RegenerateComplete { element: node })
            }
            LoadingAction::Upload => {}
        }
        Ok(())
    }

    /// Reverts a busy element immediately and drops its pending task.
    /// Not-busy elements are left alone. No completion event is emitted.
    pub fn clear_loading(&mut self, selector: &str) -> Result<()> {
        let node = self.select_one(selector)?;
        if !self.is_busy(node) {
            return Ok(());
        }

        let mut restore_label = None;
        if let Some(idx) = self.task_queue.iter().position(|task| {
            matches!(&task.kind, TaskKind::FinishLoading { node: task_node, .. } if *task_node == node)
        }) {
            let task = self.task_queue.remove(idx);
            let TaskKind::FinishLoading {
                restore_label: label,
                ..
            } = task.kind;
            restore_label = label;
            self.trace_line(format!("[timer] clear id={} due_at={}", task.id, task.due_at));
        }
        self.revert_busy(node, restore_label)
    }

    // ----- virtual clock -----

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    fn schedule(&mut self, delay_ms: i64, kind: TaskKind) -> i64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let order = self.next_task_order;
        self.next_task_order += 1;
        let due_at = self.now_ms.saturating_add(delay_ms);
        self.trace_line(format!("[timer] schedule id={id} due_at={due_at}"));
        self.task_queue.push(ScheduledTask {
            id,
            due_at,
            order,
            kind,
        });
        id
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        let mut pending: Vec<PendingTimer> = self
            .task_queue
            .iter()
            .map(|task| PendingTimer {
                id: task.id,
                due_at: task.due_at,
                order: task.order,
            })
            .collect();
        pending.sort_by_key(|timer| (timer.due_at, timer.order));
        pending
    }

    pub fn clear_timer(&mut self, timer_id: i64) -> bool {
        let before = self.task_queue.len();
        self.task_queue.retain(|task| task.id != timer_id);
        before != self.task_queue.len()
    }

    pub fn clear_all_timers(&mut self) -> usize {
        let cleared = self.task_queue.len();
        self.task_queue.clear();
        cleared
    }

    pub fn advance_time(&mut self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::Runtime(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        let from = self.now_ms;
        self.now_ms = self.now_ms.saturating_add(delta_ms);
        let ran = self.run_timer_queue(Some(self.now_ms), false)?;
        self.trace_line(format!(
            "[timer] advance delta_ms={delta_ms} from={from} to={} ran_due={ran}",
            self.now_ms
        ));
        Ok(())
    }

    pub fn advance_time_to(&mut self, target_ms: i64) -> Result<()> {
        if target_ms < self.now_ms {
            return Err(Error::Runtime(format!(
                "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={})",
                self.now_ms
            )));
        }
        let from = self.now_ms;
        self.now_ms = target_ms;
        let ran = self.run_timer_queue(Some(self.now_ms), false)?;
        self.trace_line(format!(
            "[timer] advance_to from={from} to={} ran_due={ran}",
            self.now_ms
        ));
        Ok(())
    }

    /// Runs every pending task, moving the clock to each due time.
    pub fn flush(&mut self) -> Result<()> {
        let from = self.now_ms;
        let ran = self.run_timer_queue(None, true)?;
        self.trace_line(format!("[timer] flush from={from} to={} ran={ran}", self.now_ms));
        Ok(())
    }

    pub fn run_due_timers(&mut self) -> Result<usize> {
        let ran = self.run_timer_queue(Some(self.now_ms), false)?;
        self.trace_line(format!("[timer] run_due now_ms={} ran={ran}", self.now_ms));
        Ok(ran)
    }

    fn run_timer_queue(&mut self, due_limit: Option<i64>, advance_clock: bool) -> Result<usize> {
        let mut ran = 0usize;
        while let Some(next_idx) = self.next_task_index(due_limit) {
            ran += 1;
            let task = self.task_queue.remove(next_idx);
            if advance_clock && task.due_at > self.now_ms {
                self.now_ms = task.due_at;
            }
            self.execute_task(task)?;
        }
        Ok(ran)
    }

    fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| due_limit.is_none_or(|limit| task.due_at <= limit))
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    fn execute_task(&mut self, task: ScheduledTask) -> Result<()> {
        self.trace_line(format!(
            "[timer] run id={} due_at={} now_ms={}",
            task.id, task.due_at, self.now_ms
        ));
        match task.kind {
            TaskKind::FinishLoading {
                node,
                action,
                restore_label,
            } => self.finish_loading(node, action, restore_label),
        }
    }

    // ----- assertions -----

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        self.select_one(selector).map(|_| ())
    }

    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let node = self.select_one(selector)?;
        let actual = self.dom.text_content(node);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.into(),
                expected: expected.into(),
                actual,
                dom_snippet: self.dom.dump(node),
            });
        }
        Ok(())
    }

    pub fn assert_has_class(&self, selector: &str, class_name: &str) -> Result<()> {
        let node = self.select_one(selector)?;
        if !self.dom.has_class(node, class_name) {
            return Err(Error::AssertionFailed {
                selector: selector.into(),
                expected: format!("class {class_name}"),
                actual: self.dom.attr(node, "class").unwrap_or_default(),
                dom_snippet: self.dom.dump(node),
            });
        }
        Ok(())
    }

    pub fn assert_attr(&self, selector: &str, name: &str, expected: &str) -> Result<()> {
        let node = self.select_one(selector)?;
        let actual = self.dom.attr(node, name);
        if actual.as_deref() != Some(expected) {
            return Err(Error::AssertionFailed {
                selector: selector.into(),
                expected: format!("{name}={expected}"),
                actual: actual.unwrap_or_else(|| "<missing>".into()),
                dom_snippet: self.dom.dump(node),
            });
        }
        Ok(())
    }
}

// Keydown activations accept Enter and Space; direct clicks always activate.
fn activation_suppressed(key: Option<&str>) -> bool {
    match key {
        None => false,
        Some(key) => key != "Enter" && key != " ",
    }
}

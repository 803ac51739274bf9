use super::*;

const CARD_SELECTOR: &str = ".section-card, .asset-card, .template-card, [data-card]";

impl Page {
    /// Full bootstrap: integrity gate, then every binder in fixed order.
    /// Returns `false` (and attaches nothing) when the page is malformed;
    /// the violation report has already been broadcast at that point.
    pub fn initialize(&mut self) -> Result<bool> {
        let report = self.check_integrity();
        if !report.ok() {
            return Ok(false);
        }

        self.rebind_nav()?;
        self.rebind_toggles()?;
        self.rebind_cards()?;
        self.rebind_modals()?;
        self.bind_loading()?;
        self.bind_style()?;

        self.emit(PageEvent::AppInitialized);
        Ok(true)
    }

    /// Runs the structural validation pass and broadcasts the report when
    /// anything is wrong. Read-only with respect to the DOM.
    pub fn check_integrity(&mut self) -> IntegrityReport {
        let report = run_integrity_check(&self.dom);
        if !report.ok() {
            self.emit(PageEvent::IntegrityFail {
                errors: report.violations().to_vec(),
            });
        }
        report
    }

    /// Applies the active-link state to every nav link and announces the
    /// resolved page. Safe to re-run any number of times; the granular
    /// rebind entry points all bypass the integrity gate on purpose, so
    /// dynamically injected content can be wired without re-validating.
    pub fn rebind_nav(&mut self) -> Result<()> {
        let page = self
            .dom
            .root_element()
            .and_then(|root| self.dom.attr(root, PAGE_ATTR))
            .unwrap_or_default();
        let target = expected_nav_target(&page)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| page.clone());

        for link in self.dom.elements_with_attr("data-nav-link") {
            let matched = self
                .dom
                .attr(link, "href")
                .is_some_and(|href| href_matches_target(&href, &target));
            if matched {
                self.dom.add_class(link, ACTIVE_CLASS);
                self.dom.set_attr(link, "aria-current", "page")?;
            } else {
                self.dom.remove_class(link, ACTIVE_CLASS);
                self.dom.remove_attr(link, "aria-current")?;
            }
        }

        self.emit(PageEvent::NavChanged { page: target });
        Ok(())
    }

    pub fn rebind_toggles(&mut self) -> Result<()> {
        for toggle in self.dom.elements_with_attr("data-toggle") {
            self.bind_activation(toggle, Behavior::ToggleSwitch);
        }
        Ok(())
    }

    pub fn rebind_cards(&mut self) -> Result<()> {
        for card in self.dom.query_selector_all(CARD_SELECTOR)? {
            let kind = classify_card(&self.dom, card);
            self.bind_activation(card, Behavior::SelectCard(kind));
        }
        Ok(())
    }

    pub fn rebind_modals(&mut self) -> Result<()> {
        for trigger in self.dom.elements_with_attr("data-modal-target") {
            let target_id = self.dom.attr(trigger, "data-modal-target").unwrap_or_default();
            // A trigger pointing nowhere binds nothing; the checker is the
            // place where that mistake is surfaced.
            let Some(modal) = self.dom.element_by_id(&target_id) else {
                continue;
            };

            self.bindings.add(
                trigger,
                Binding {
                    on: EventKind::Click,
                    behavior: Behavior::OpenModal { modal },
                },
            );

            for node in self.dom.descendant_elements(modal) {
                if self.dom.has_attr(node, "data-modal-close") {
                    self.bindings.add(
                        node,
                        Binding {
                            on: EventKind::Click,
                            behavior: Behavior::CloseModal { modal },
                        },
                    );
                }
                if self.dom.has_attr(node, "data-modal-backdrop") {
                    self.bindings.add(
                        node,
                        Binding {
                            on: EventKind::Click,
                            behavior: Behavior::CloseModalBackdrop { modal },
                        },
                    );
                }
            }
        }

        if let Some(root) = self.dom.root_element() {
            self.bindings.add(
                root,
                Binding {
                    on: EventKind::Keydown,
                    behavior: Behavior::EscapeCloseModals,
                },
            );
        }
        Ok(())
    }

    pub(crate) fn bind_loading(&mut self) -> Result<()> {
        for node in self.dom.query_selector_all("[data-action=generate]")? {
            self.bind_activation(node, Behavior::StartLoading(LoadingAction::Generate));
        }
        for node in self.dom.query_selector_all("[data-action=regenerate]")? {
            self.bind_activation(node, Behavior::StartLoading(LoadingAction::Regenerate));
        }
        for node in self.dom.elements_with_attr("data-upload-trigger") {
            self.bind_activation(node, Behavior::StartLoading(LoadingAction::Upload));
        }
        Ok(())
    }

    pub(crate) fn bind_style(&mut self) -> Result<()> {
        if let Some(node) = self.dom.element_by_id("style-selector") {
            self.bindings.add(
                node,
                Binding {
                    on: EventKind::Change,
                    behavior: Behavior::EmitStyleChange,
                },
            );
        }
        Ok(())
    }

    // Click plus keyboard activation (Enter/Space), the pairing every
    // interactive element here gets.
    fn bind_activation(&mut self, node: NodeId, behavior: Behavior) {
        self.bindings.add(
            node,
            Binding {
                on: EventKind::Click,
                behavior,
            },
        );
        self.bindings.add(
            node,
            Binding {
                on: EventKind::Keydown,
                behavior,
            },
        );
    }
}

fn classify_card(dom: &Dom, node: NodeId) -> CardKind {
    if dom.has_class(node, "section-card") {
        CardKind::Section
    } else if dom.has_class(node, "asset-card") {
        CardKind::Asset
    } else if dom.has_class(node, "template-card") {
        CardKind::Template
    } else {
        CardKind::Generic
    }
}

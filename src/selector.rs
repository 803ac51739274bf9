use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectorAttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
    StartsWith { key: String, value: String },
    Includes { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SelectorStep {
    pub(crate) tag: Option<String>,
    pub(crate) universal: bool,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) attrs: Vec<SelectorAttrCondition>,
}

impl SelectorStep {
    pub(crate) fn id_only(&self) -> Option<&str> {
        if !self.universal && self.tag.is_none() && self.classes.is_empty() && self.attrs.is_empty()
        {
            self.id.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectorCombinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorPart {
    pub(crate) step: SelectorStep,
    // Relation to previous (left) selector part.
    pub(crate) combinator: Option<SelectorCombinator>,
}

/// Parses a comma-separated selector list into chains of steps.
pub(crate) fn parse_selector_groups(selector: &str) -> Result<Vec<Vec<SelectorPart>>> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }

    let mut groups = Vec::new();
    for group in split_selector_groups(selector)? {
        let group = group.trim();
        if group.is_empty() {
            return Err(Error::UnsupportedSelector(selector.into()));
        }
        groups.push(parse_selector_chain(group)?);
    }
    Ok(groups)
}

// Splits on top-level commas; commas inside attribute brackets do not split.
fn split_selector_groups(selector: &str) -> Result<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0usize;
    for ch in selector.chars() {
        match ch {
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::UnsupportedSelector(selector.into()))?;
                current.push(ch);
            }
            ',' if bracket_depth == 0 => {
                groups.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if bracket_depth != 0 {
        return Err(Error::UnsupportedSelector(selector.into()));
    }
    groups.push(current);
    Ok(groups)
}

fn parse_selector_chain(selector: &str) -> Result<Vec<SelectorPart>> {
    let tokens = tokenize_selector(selector)?;
    let mut parts: Vec<SelectorPart> = Vec::new();
    let mut pending_combinator: Option<SelectorCombinator> = None;

    for token in tokens {
        if token == ">" {
            if pending_combinator.is_some() || parts.is_empty() {
                return Err(Error::UnsupportedSelector(selector.into()));
            }
            pending_combinator = Some(SelectorCombinator::Child);
            continue;
        }
        if token == "+" || token == "~" {
            return Err(Error::UnsupportedSelector(selector.into()));
        }

        let step = parse_selector_step(&token, selector)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(
                pending_combinator
                    .take()
                    .unwrap_or(SelectorCombinator::Descendant),
            )
        };
        parts.push(SelectorPart { step, combinator });
    }

    if pending_combinator.is_some() || parts.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }
    Ok(parts)
}

// Whitespace separates compound steps; '>' is kept as its own token.
// Whitespace inside attribute brackets belongs to the step.
fn tokenize_selector(selector: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0usize;
    for ch in selector.chars() {
        match ch {
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::UnsupportedSelector(selector.into()))?;
                current.push(ch);
            }
            ch if ch.is_whitespace() && bracket_depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            '>' | '+' | '~' if bracket_depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }
    Ok(tokens)
}

fn parse_selector_step(token: &str, selector: &str) -> Result<SelectorStep> {
    let mut step = SelectorStep::default();
    let chars: Vec<char> = token.chars().collect();
    let mut i = 0usize;

    // Optional leading tag name or universal marker.
    if i < chars.len() && chars[i] == '*' {
        step.universal = true;
        i += 1;
    } else {
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '-') {
            i += 1;
        }
        if i > start {
            step.tag = Some(
                chars[start..i]
                    .iter()
                    .collect::<String>()
                    .to_ascii_lowercase(),
            );
        }
    }

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                if i == start {
                    return Err(Error::UnsupportedSelector(selector.into()));
                }
                step.classes.push(chars[start..i].iter().collect());
            }
            '#' => {
                i += 1;
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                if i == start || step.id.is_some() {
                    return Err(Error::UnsupportedSelector(selector.into()));
                }
                step.id = Some(chars[start..i].iter().collect());
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|ch| *ch == ']')
                    .ok_or_else(|| Error::UnsupportedSelector(selector.into()))?;
                let body: String = chars[i + 1..i + close].iter().collect();
                step.attrs.push(parse_attr_condition(body.trim(), selector)?);
                i += close + 1;
            }
            _ => return Err(Error::UnsupportedSelector(selector.into())),
        }
    }

    if !step.universal
        && step.tag.is_none()
        && step.id.is_none()
        && step.classes.is_empty()
        && step.attrs.is_empty()
    {
        return Err(Error::UnsupportedSelector(selector.into()));
    }
    Ok(step)
}

fn parse_attr_condition(body: &str, selector: &str) -> Result<SelectorAttrCondition> {
    if body.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }

    let Some(eq_pos) = body.find('=') else {
        if !is_attr_name(body) {
            return Err(Error::UnsupportedSelector(selector.into()));
        }
        return Ok(SelectorAttrCondition::Exists { key: body.into() });
    };

    let (raw_key, raw_value) = body.split_at(eq_pos);
    let raw_value = &raw_value[1..];
    let (key, op) = match raw_key.chars().last() {
        Some('^') => (&raw_key[..raw_key.len() - 1], '^'),
        Some('~') => (&raw_key[..raw_key.len() - 1], '~'),
        Some('$') | Some('*') | Some('|') => {
            return Err(Error::UnsupportedSelector(selector.into()));
        }
        _ => (raw_key, '='),
    };
    let key = key.trim();
    if !is_attr_name(key) {
        return Err(Error::UnsupportedSelector(selector.into()));
    }

    let value = unquote_attr_value(raw_value.trim());
    let key = key.to_string();
    Ok(match op {
        '^' => SelectorAttrCondition::StartsWith { key, value },
        '~' => SelectorAttrCondition::Includes { key, value },
        _ => SelectorAttrCondition::Eq { key, value },
    })
}

fn unquote_attr_value(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn is_attr_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

pub(crate) fn step_matches(dom: &Dom, node: NodeId, step: &SelectorStep) -> bool {
    let Some(element) = dom.element(node) else {
        return false;
    };

    if let Some(tag) = &step.tag {
        if !element.tag_name.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &step.id {
        if element.attrs.get("id") != Some(id) {
            return false;
        }
    }
    for class_name in &step.classes {
        if !has_class(element, class_name) {
            return false;
        }
    }
    for condition in &step.attrs {
        let matched = match condition {
            SelectorAttrCondition::Exists { key } => element.attrs.contains_key(key),
            SelectorAttrCondition::Eq { key, value } => {
                element.attrs.get(key).map(String::as_str) == Some(value.as_str())
            }
            SelectorAttrCondition::StartsWith { key, value } => element
                .attrs
                .get(key)
                .is_some_and(|actual| !value.is_empty() && actual.starts_with(value)),
            SelectorAttrCondition::Includes { key, value } => element
                .attrs
                .get(key)
                .is_some_and(|actual| actual.split_whitespace().any(|token| token == value)),
        };
        if !matched {
            return false;
        }
    }
    true
}

pub(crate) fn chain_matches(dom: &Dom, node: NodeId, parts: &[SelectorPart]) -> bool {
    let Some((last, prefix)) = parts.split_last() else {
        return false;
    };
    if !step_matches(dom, node, &last.step) {
        return false;
    }
    let Some(combinator) = last.combinator else {
        return prefix.is_empty();
    };
    match combinator {
        SelectorCombinator::Child => dom
            .parent_element(node)
            .is_some_and(|parent| chain_matches(dom, parent, prefix)),
        SelectorCombinator::Descendant => {
            let mut cursor = dom.parent_element(node);
            while let Some(ancestor) = cursor {
                if chain_matches(dom, ancestor, prefix) {
                    return true;
                }
                cursor = dom.parent_element(ancestor);
            }
            false
        }
    }
}

impl Dom {
    pub(crate) fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let groups = parse_selector_groups(selector)?;

        // Single bare-id step resolves through the index.
        if let [chain] = groups.as_slice() {
            if let [part] = chain.as_slice() {
                if let Some(id) = part.step.id_only() {
                    return Ok(self.element_by_id(id));
                }
            }
        }

        Ok(self
            .all_elements()
            .into_iter()
            .find(|node| groups.iter().any(|chain| chain_matches(self, *node, chain))))
    }

    pub(crate) fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let groups = parse_selector_groups(selector)?;
        Ok(self
            .all_elements()
            .into_iter()
            .filter(|node| groups.iter().any(|chain| chain_matches(self, *node, chain)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Result<Dom> {
        parse_html(
            "<div id='a' class='card big' data-kind='x y'>\
               <p id='b'><span id='c' data-flag>t</span></p>\
             </div>\
             <p id='d' class='card'></p>",
        )
    }

    #[test]
    fn matches_tag_class_id_and_attrs() -> Result<()> {
        let dom = fixture()?;
        let a = dom.element_by_id("a").unwrap();
        let d = dom.element_by_id("d").unwrap();

        assert_eq!(dom.query_selector("div.card")?, Some(a));
        assert_eq!(dom.query_selector("#d")?, Some(d));
        assert_eq!(dom.query_selector("[data-kind~=y]")?, Some(a));
        assert_eq!(dom.query_selector("[data-kind^='x ']")?, Some(a));
        assert_eq!(dom.query_selector("[data-kind=z]")?, None);
        assert_eq!(dom.query_selector_all(".card")?.len(), 2);
        Ok(())
    }

    #[test]
    fn combinators_walk_ancestors() -> Result<()> {
        let dom = fixture()?;
        let c = dom.element_by_id("c").unwrap();

        assert_eq!(dom.query_selector("div span")?, Some(c));
        assert_eq!(dom.query_selector("p > span")?, Some(c));
        assert_eq!(dom.query_selector("div > span")?, None);
        Ok(())
    }

    #[test]
    fn groups_union_in_document_order() -> Result<()> {
        let dom = fixture()?;
        let found = dom.query_selector_all("#d, [data-flag], #a")?;
        let ids: Vec<_> = found
            .into_iter()
            .map(|node| dom.attr(node, "id").unwrap())
            .collect();
        assert_eq!(ids, ["a", "c", "d"]);
        Ok(())
    }

    #[test]
    fn unsupported_syntax_is_an_error() -> Result<()> {
        let dom = fixture()?;
        for selector in [
            "",
            "  ",
            "p:first-child",
            "a ~ b",
            "[data-kind$=y]",
            "..x",
            "a >",
        ] {
            assert!(
                matches!(
                    dom.query_selector(selector),
                    Err(Error::UnsupportedSelector(_))
                ),
                "selector {selector:?} should be rejected"
            );
        }
        Ok(())
    }
}

//! In-page resolution of semantic locators.
//!
//! Every primitive ships one self-contained script to the page: the selector is
//! re-evaluated from scratch, the `nth` match is picked, and the requested operation
//! runs against it. No element handles survive between calls. An unpinned text locator
//! prefers the first visible match, so a hidden copy of the text cannot shadow the
//! rendered one.

use crate::{
    errors::ActionError,
    types::{ElementState, Locator, Selector},
};
use serde_json::{json, Value};

/// What the resolver script does with the selected match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOp {
    /// Report count, visibility, text and attributes. Never fails on absence.
    Inspect,
    /// Focus and select the element's content; clear it when `clear` is set.
    Focus { clear: bool },
    /// Scroll the element into view and report its centre point.
    Target,
}

impl ScriptOp {
    fn as_js(self) -> &'static str {
        match self {
            ScriptOp::Inspect => "'inspect'",
            ScriptOp::Focus { .. } => "'focus'",
            ScriptOp::Target => "'target'",
        }
    }
}

fn selector_spec(selector: &Selector) -> Value {
    match selector {
        Selector::Role { role, name, exact } => {
            json!({ "kind": "role", "role": role, "name": name, "exact": exact })
        }
        Selector::Label(text) => json!({ "kind": "label", "text": text }),
        Selector::Placeholder(text) => json!({ "kind": "placeholder", "text": text }),
        Selector::Text { content, exact } => {
            json!({ "kind": "text", "text": content, "exact": exact })
        }
        Selector::Attribute { scope, name, value } => {
            json!({ "kind": "attribute", "scope": scope, "name": name, "value": value })
        }
        Selector::Css(css) => json!({ "kind": "css", "css": css }),
    }
}

/// Build the page script for `locator`. Literals are embedded as JSON, so quotes and
/// backslashes in user text cannot break out of the string.
pub fn resolver_script(locator: &Locator, op: ScriptOp) -> String {
    let clear = matches!(op, ScriptOp::Focus { clear: true });
    format!(
        "(() => {{\nconst spec = {spec};\nconst nth = {nth};\nconst pinned = {pinned};\nconst op = {op};\nconst clear = {clear};\n{body}\n}})()",
        spec = selector_spec(&locator.selector),
        nth = locator.nth.unwrap_or(0),
        pinned = locator.nth.is_some(),
        op = op.as_js(),
        clear = clear,
        body = RESOLVER_BODY,
    )
}

const RESOLVER_BODY: &str = r#"
const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const lower = (s) => norm(s).toLowerCase();
const isVisible = (el) => {
    if (!(el instanceof Element) || !el.isConnected) return false;
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
};
const isDisabled = (el) =>
    el.matches(':disabled') || el.getAttribute('aria-disabled') === 'true';
const implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    switch (tag) {
        case 'button': return 'button';
        case 'a': return el.hasAttribute('href') ? 'link' : null;
        case 'article': return 'article';
        case 'textarea': return 'textbox';
        case 'select': return 'combobox';
        case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
        case 'input': {
            const type = (el.getAttribute('type') || 'text').toLowerCase();
            if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
            if (type === 'checkbox' || type === 'radio') return type;
            if (type === 'hidden') return null;
            return 'textbox';
        }
        default: return null;
    }
};
const roleOf = (el) => {
    const explicit = (el.getAttribute('role') || '').trim().split(/\s+/)[0];
    return explicit || implicitRole(el);
};
const byIds = (ids) => ids.split(/\s+/)
    .map((id) => document.getElementById(id))
    .filter(Boolean);
const labelsOf = (el) => {
    const out = [];
    const aria = el.getAttribute('aria-label');
    if (aria) out.push(aria);
    const labelledby = el.getAttribute('aria-labelledby');
    if (labelledby) out.push(byIds(labelledby).map((n) => n.textContent || '').join(' '));
    if (el.labels) Array.from(el.labels).forEach((l) => out.push(l.textContent || ''));
    return out.map(norm).filter(Boolean);
};
const accessibleName = (el) => {
    const labels = labelsOf(el);
    if (labels.length) return labels[0];
    const tag = el.tagName.toLowerCase();
    if (tag === 'input') {
        const type = (el.getAttribute('type') || 'text').toLowerCase();
        if (['button', 'submit', 'reset'].includes(type)) return norm(el.value);
        return norm(el.getAttribute('placeholder') || el.getAttribute('title'));
    }
    if (tag === 'textarea') return norm(el.getAttribute('placeholder') || el.getAttribute('title'));
    return norm(el.innerText || el.textContent) || norm(el.getAttribute('title'));
};
const everything = () => Array.from(document.querySelectorAll('body *'))
    .filter((el) => !['SCRIPT', 'STYLE', 'TEMPLATE', 'NOSCRIPT'].includes(el.tagName));
const candidates = () => {
    switch (spec.kind) {
        case 'role':
            return everything().filter((el) => {
                if (roleOf(el) !== spec.role) return false;
                if (spec.name == null) return true;
                const name = accessibleName(el);
                return spec.exact ? name === norm(spec.name) : lower(name).includes(lower(spec.name));
            });
        case 'label':
            return everything().filter((el) => labelsOf(el).some((l) => lower(l).includes(lower(spec.text))));
        case 'placeholder':
            return Array.from(document.querySelectorAll('[placeholder]'))
                .filter((el) => lower(el.getAttribute('placeholder')).includes(lower(spec.text)));
        case 'text': {
            const hit = (el) => spec.exact
                ? norm(el.textContent) === norm(spec.text)
                : (el.textContent || '').includes(spec.text);
            return everything().filter((el) => hit(el) && !Array.from(el.children).some(hit));
        }
        case 'attribute':
            return Array.from(document.querySelectorAll(spec.scope))
                .filter((el) => el.getAttribute(spec.name) === spec.value);
        case 'css':
            return Array.from(document.querySelectorAll(spec.css));
        default:
            return [];
    }
};
let matches;
try {
    matches = candidates();
} catch (err) {
    matches = [];
}
const el = (!pinned && spec.kind === 'text')
    ? (matches.find(isVisible) || matches[0] || null)
    : (matches[nth] || null);
const count = matches.length;
if (op === 'inspect') {
    if (!el) return { count, visible: false, enabled: false, text: null, attributes: {} };
    const attributes = {};
    for (const attr of Array.from(el.attributes)) attributes[attr.name] = attr.value;
    const text = typeof el.innerText === 'string' ? el.innerText : (el.textContent || '');
    return { count, visible: isVisible(el), enabled: !isDisabled(el), text, attributes };
}
if (!el) return { status: 'not-found', count };
if (!isVisible(el)) return { status: 'not-visible', count };
if (isDisabled(el)) return { status: 'disabled', count };
el.scrollIntoView({ block: 'center', inline: 'center' });
if (op === 'focus') {
    el.focus();
    if (typeof el.select === 'function') {
        el.select();
    } else if (el.isContentEditable) {
        const range = document.createRange();
        range.selectNodeContents(el);
        const selection = window.getSelection();
        selection.removeAllRanges();
        selection.addRange(range);
    }
    if (clear) {
        if ('value' in el) {
            const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
            if (desc && desc.set) desc.set.call(el, ''); else el.value = '';
        } else {
            el.textContent = '';
        }
        el.dispatchEvent(new Event('input', { bubbles: true }));
    }
    return { status: 'ok', count };
}
const rect = el.getBoundingClientRect();
return { status: 'ok', count, x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };
"#;

/// Decode the result of an [`ScriptOp::Inspect`] script.
pub fn parse_element_state(value: Value) -> Result<ElementState, ActionError> {
    serde_json::from_value(value)
        .map_err(|err| ActionError::Internal(format!("malformed element state: {err}")))
}

/// Turn the status of a `Focus`/`Target` script into a result naming the locator.
pub fn check_status(value: &Value, locator: &Locator) -> Result<(), ActionError> {
    let descriptor = locator.descriptor();
    match value.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(()),
        Some("not-found") => Err(ActionError::AnchorNotFound(descriptor)),
        Some("not-visible") => Err(ActionError::NotClickable(format!(
            "{descriptor} is not visible"
        ))),
        Some("disabled") => Err(ActionError::NotEnabled(descriptor)),
        other => Err(ActionError::Internal(format!(
            "unexpected resolver status {other:?} for {descriptor}"
        ))),
    }
}

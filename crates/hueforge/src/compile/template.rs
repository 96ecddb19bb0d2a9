//! Rule templates shared between switches.

use std::collections::BTreeMap;

use hueforge_config::Action;
use hueforge_config::ActionKind;
use hueforge_config::Binding;
use hueforge_config::Code;
use hueforge_config::DimAction;
use hueforge_config::Template;

/// Brightness steps of the dimmer template: (button, step, transition time).
///
/// A long press keeps dimming while held; releasing it stops the transition
/// with a zero step.
const DIMMER: &[(&str, i16, Option<u16>)] = &[
    ("up-press", 30, Some(9)),
    ("up-hold", 56, Some(9)),
    ("up-long", 0, None),
    ("down-press", -30, Some(9)),
    ("down-hold", -56, Some(9)),
    ("down-long", 0, None),
];

fn bindings(template: Template) -> impl Iterator<Item = (Code, Binding)> {
    let entries = match template {
        Template::Dimmer => DIMMER,
    };
    entries.iter().map(|&(code, value, tt)| {
        (
            Code::from(code),
            Binding::Action(Action::new(ActionKind::Dim(DimAction { value, tt }))),
        )
    })
}

/// Add the bindings of every template; explicit bindings win.
pub fn expand(
    templates: &[Template],
    explicit: &BTreeMap<Code, Binding>,
) -> BTreeMap<Code, Binding> {
    let mut expanded = explicit.clone();
    for &template in templates {
        for (code, binding) in bindings(template) {
            expanded.entry(code).or_insert(binding);
        }
    }
    expanded
}

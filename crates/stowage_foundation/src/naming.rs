//! Column and table naming rules.
//!
//! A field nested under a container field (a contained object or a list) is
//! stored under a composed name: the de-pluralized container name followed
//! by the capitalized, de-pluralized field name. `orders` + `items` becomes
//! `orderItem`.

/// Strips a trailing `s`, with the irregular `children` → `child`.
///
/// Deliberately naive: `class` becomes `clas`.
#[must_use]
pub fn de_pluralize(plural: &str) -> String {
    match plural {
        "children" => return "child".to_string(),
        "Children" => return "Child".to_string(),
        _ => {}
    }
    strip_trailing_s(plural).to_string()
}

/// Composes the storage name of `contained` nested under `container`.
#[must_use]
pub fn contained_name(container: &str, contained: &str) -> String {
    let composed = format!("{}{}", de_pluralize(container), capitalize(contained));
    de_pluralize(strip_trailing_s(&composed))
}

/// Uppercases the first character.
#[must_use]
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercases the first character.
#[must_use]
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derives a field name from an accessor pair.
///
/// The getter must start with `get` or `is`, the setter with `set`, and both
/// must share the remaining suffix. Returns the decapitalized suffix, or
/// `None` if the pair does not name one field.
#[must_use]
pub fn property_name(getter: &str, setter: &str) -> Option<String> {
    let getter_suffix = getter
        .strip_prefix("get")
        .or_else(|| getter.strip_prefix("is"))?;
    let setter_suffix = setter.strip_prefix("set")?;
    if getter_suffix.is_empty() || getter_suffix != setter_suffix {
        return None;
    }
    Some(decapitalize(getter_suffix))
}

/// Replaces spaces with underscores in table and schema names.
#[must_use]
pub fn sanitize_identifier(name: &str) -> String {
    name.replace(' ', "_")
}

fn strip_trailing_s(name: &str) -> &str {
    if name.len() > 1 {
        name.strip_suffix('s').unwrap_or(name)
    } else {
        name
    }
}

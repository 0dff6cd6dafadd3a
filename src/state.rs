//! The small set of singleton objects every script needs before it runs a
//! single statement: the lobby (root of the slot-and-parent graph every
//! top-level expression is implicitly evaluated against), `nil`/`true`/
//! `false`, and the traits objects integers and floats delegate to since
//! they are not themselves heap objects with a map.

use crate::value::Value;

pub struct State {
    pub lobby: Value,
    pub nil: Value,
    pub true_object: Value,
    pub false_object: Value,
    pub integer_traits: Value,
    pub float_traits: Value,
    /// The shared empty map every byte-array (string) object's header
    /// points at. Strings have no slots of their own and are never sent
    /// ordinary messages directly (only `_`-prefixed primitives take them
    /// as arguments), but their header still needs a real `Map` object
    /// so the lookup machinery's `map_of` never has to special-case them.
    pub byte_array_map: Value,
}

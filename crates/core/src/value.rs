//! Property values and ordered collections
//!
//! A [`Value`] is schema-agnostic: the payload decides the shape, the type
//! metadata decides the meaning. An empty JSON array therefore decodes as an
//! empty [`Value::OrderedList`] and is accepted wherever an unordered list is
//! expected as well (see [`Value::members`] and [`Value::ordered_items`]).
//!
//! Ordered collections are lists of [`OrderedItem`]s. Their position keys form
//! a set that reordering never changes: [`move_item`] permutes the values and
//! keeps every key in place.

use crate::types::Iid;
use serde::{Deserialize, Serialize};

/// A property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Identity reference
    Id(Iid),
    /// Text
    Text(String),
    /// Ordered collection
    OrderedList(Vec<OrderedItem>),
    /// Unordered collection
    List(Vec<Value>),
}

impl Value {
    /// Unordered list of identities
    pub fn id_list<I: IntoIterator<Item = Iid>>(ids: I) -> Self {
        Value::List(ids.into_iter().map(Value::Id).collect())
    }

    /// True for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for either collection variant
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::List(_) | Value::OrderedList(_))
    }

    /// Identity, if this is an id
    pub fn as_id(&self) -> Option<Iid> {
        match self {
            Value::Id(iid) => Some(*iid),
            _ => None,
        }
    }

    /// Text, if this is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Members of an unordered collection
    pub fn members(&self) -> Option<&[Value]> {
        match self {
            Value::List(members) => Some(members),
            Value::OrderedList(items) if items.is_empty() => Some(&[]),
            _ => None,
        }
    }

    /// Items of an ordered collection
    pub fn ordered_items(&self) -> Option<&[OrderedItem]> {
        match self {
            Value::OrderedList(items) => Some(items),
            Value::List(members) if members.is_empty() => Some(&[]),
            _ => None,
        }
    }

    /// Identities held by an unordered collection
    pub fn ids(&self) -> Vec<Iid> {
        self.members()
            .map(|members| members.iter().filter_map(Value::as_id).collect())
            .unwrap_or_default()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Iid> for Value {
    fn from(iid: Iid) -> Self {
        Value::Id(iid)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Entry of an ordered collection
///
/// Serialized with the short keys `k` (position), `v` (value) and `m`
/// (requested new position).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedItem {
    /// Position key
    #[serde(rename = "k")]
    pub key: i64,
    /// Value at this position
    #[serde(rename = "v")]
    pub value: Value,
    /// Requested new position
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub move_to: Option<i64>,
}

impl OrderedItem {
    /// Item at `key`
    pub fn new(key: i64, value: impl Into<Value>) -> Self {
        OrderedItem {
            key,
            value: value.into(),
            move_to: None,
        }
    }

    /// Request a move of this item to `to`
    pub fn moved_to(mut self, to: i64) -> Self {
        self.move_to = Some(to);
        self
    }
}

/// Next free position key (one past the largest, starting at 1)
pub fn next_key(items: &[OrderedItem]) -> i64 {
    items.iter().map(|item| item.key).max().map_or(1, |max| max + 1)
}

/// Insert an item, keeping the collection sorted by key
///
/// Returns false if the key is already taken.
pub fn insert_item(items: &mut Vec<OrderedItem>, item: OrderedItem) -> bool {
    if items.iter().any(|existing| existing.key == item.key) {
        return false;
    }
    items.push(OrderedItem {
        move_to: None,
        ..item
    });
    items.sort_by_key(|item| item.key);
    true
}

/// Remove the item at `key` holding `value`
///
/// Returns false if no such item exists.
pub fn remove_item(items: &mut Vec<OrderedItem>, key: i64, value: &Value) -> bool {
    let before = items.len();
    items.retain(|item| !(item.key == key && &item.value == value));
    items.len() != before
}

/// Move the value at key `from` to the position of key `to`
///
/// Values in between shift by one place; the set of keys is unchanged.
/// Returns false if either key is absent.
pub fn move_item(items: &mut [OrderedItem], from: i64, to: i64) -> bool {
    items.sort_by_key(|item| item.key);
    let keys: Vec<i64> = items.iter().map(|item| item.key).collect();
    let (Some(src), Some(dst)) = (
        keys.iter().position(|k| *k == from),
        keys.iter().position(|k| *k == to),
    ) else {
        return false;
    };

    if src < dst {
        items[src..=dst].rotate_left(1);
    } else {
        items[dst..=src].rotate_right(1);
    }
    for (item, key) in items.iter_mut().zip(keys) {
        item.key = key;
        item.move_to = None;
    }
    true
}

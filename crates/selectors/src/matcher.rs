//! Selector matching engine.
//! See <https://www.w3.org/TR/selectors-3/>

use crate::{
    Combinator, ComplexSelector, CompoundSelector, ElementAdapter, SelectorList, SimpleSelector,
};

/// Match a selector list against an element.
pub fn matches_selector_list<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    list: &SelectorList,
) -> bool {
    list.selectors
        .iter()
        .any(|selector_item| matches_complex(adapter, element, selector_item))
}

/// Match a complex selector against an element.
///
/// Every candidate ancestor or sibling is tried before giving up, so
/// `div > p span` matches even when the nearest `p` is not a child of a `div`.
pub fn matches_complex<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
) -> bool {
    matches_from(adapter, element, sel, sel.rest.len())
}

/// Compound at `index`, counting `sel.first` as zero.
fn compound_at(sel: &ComplexSelector, index: usize) -> Option<&CompoundSelector> {
    match index.checked_sub(1) {
        None => Some(&sel.first),
        Some(rest_index) => sel.rest.get(rest_index).map(|pair| &pair.1),
    }
}

/// Match compound `index` against `element` and recurse leftwards through its combinator.
fn matches_from<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
    index: usize,
) -> bool {
    let Some(compound) = compound_at(sel, index) else {
        return false;
    };
    if !matches_compound(adapter, element, compound) {
        return false;
    }
    let Some(left_index) = index.checked_sub(1) else {
        return true;
    };
    let Some(&(combinator, _)) = sel.rest.get(left_index) else {
        return false;
    };
    match combinator {
        Combinator::Descendant => {
            let mut current_parent = adapter.parent(element);
            while let Some(ancestor_element) = current_parent {
                if matches_from(adapter, ancestor_element, sel, left_index) {
                    return true;
                }
                current_parent = adapter.parent(ancestor_element);
            }
            false
        }
        Combinator::Child => adapter
            .parent(element)
            .is_some_and(|parent_el| matches_from(adapter, parent_el, sel, left_index)),
        Combinator::AdjacentSibling => adapter
            .previous_sibling_element(element)
            .is_some_and(|prev_el| matches_from(adapter, prev_el, sel, left_index)),
        Combinator::GeneralSibling => {
            let mut current_sibling = adapter.previous_sibling_element(element);
            while let Some(sibling_element) = current_sibling {
                if matches_from(adapter, sibling_element, sel, left_index) {
                    return true;
                }
                current_sibling = adapter.previous_sibling_element(sibling_element);
            }
            false
        }
    }
}

/// Match a compound selector against a single element.
pub fn matches_compound<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    compound: &CompoundSelector,
) -> bool {
    compound
        .simples
        .iter()
        .all(|simple| matches_simple(adapter, element, simple))
}

fn matches_simple<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    simple: &SimpleSelector,
) -> bool {
    match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(type_name) => adapter.tag_name(element) == type_name.as_str(),
        SimpleSelector::Class(class_name) => adapter.has_class(element, class_name),
        SimpleSelector::IdSelector(id_value) => adapter
            .element_id(element)
            .is_some_and(|value| value == id_value.as_str()),
        SimpleSelector::AttrEquals { name, value } => adapter
            .attr(element, name)
            .is_some_and(|attr_value| attr_value == value.as_str()),
        SimpleSelector::AttrExists(name) => adapter.attr(element, name).is_some(),
        SimpleSelector::NthChild(position) => sibling_position(adapter, element, false) == *position,
        SimpleSelector::NthOfType(position) => sibling_position(adapter, element, true) == *position,
        SimpleSelector::Root => adapter.parent(element).is_none(),
    }
}

/// One-based position among preceding element siblings, optionally of the same tag only.
fn sibling_position<A: ElementAdapter>(adapter: &A, element: A::Handle, same_type: bool) -> usize {
    let tag = adapter.tag_name(element);
    let mut position = 1_usize;
    let mut current_sibling = adapter.previous_sibling_element(element);
    while let Some(sibling_element) = current_sibling {
        if !same_type || adapter.tag_name(sibling_element) == tag {
            position = position.saturating_add(1);
        }
        current_sibling = adapter.previous_sibling_element(sibling_element);
    }
    position
}

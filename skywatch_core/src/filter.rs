//! Visibility state: active classification filter plus operator selection.
//!
//! [`FilterState::is_visible`] is the single visibility rule. The
//! reconciler and the list projector both call it, so the map and the list
//! can never disagree about which tracks are shown.

use skywatch_env::{AreaId, FilterChange, FlightId};
use std::collections::BTreeSet;

use crate::track_store::Track;

/// Selection axes. Flight and area selection are independent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub flight: Option<FlightId>,
    pub area: Option<AreaId>,
}

/// Active classification filter and current selection.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    active: BTreeSet<String>,
    selection: SelectionState,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible iff selected, or no filter is active, or the classification is active.
    pub fn is_visible(&self, track: &Track) -> bool {
        self.is_selected(&track.id)
            || self.active.is_empty()
            || self.active.contains(&track.classification)
    }

    #[inline]
    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.flight.as_deref() == Some(id)
    }

    pub fn selected_flight(&self) -> Option<&str> {
        self.selection.flight.as_deref()
    }

    pub fn selected_area(&self) -> Option<AreaId> {
        self.selection.area
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Active classification names; empty means "show all".
    pub fn active_classifications(&self) -> &BTreeSet<String> {
        &self.active
    }

    /// Sets or clears the selected flight. Returns true if it changed.
    pub fn set_selection(&mut self, id: Option<FlightId>) -> bool {
        if self.selection.flight == id {
            return false;
        }
        self.selection.flight = id;
        true
    }

    /// Sets or clears the selected area. Returns true if it changed.
    pub fn select_area(&mut self, id: Option<AreaId>) -> bool {
        if self.selection.area == id {
            return false;
        }
        self.selection.area = id;
        true
    }

    /// Flips membership of `name` and returns the new membership.
    pub fn toggle_classification(&mut self, name: &str) -> bool {
        if self.active.remove(name) {
            false
        } else {
            self.active.insert(name.to_string());
            true
        }
    }

    /// Sets membership of `name`. Returns true if the filter changed.
    pub fn set_classification(&mut self, name: &str, enabled: bool) -> bool {
        if enabled {
            self.active.insert(name.to_string())
        } else {
            self.active.remove(name)
        }
    }

    /// Replaces the whole filter set. Returns true if it changed.
    pub fn set_active_classifications<I, S>(&mut self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if next == self.active {
            return false;
        }
        self.active = next;
        true
    }

    /// Outbound notice describing the active filter.
    pub fn change_notice(&self) -> FilterChange {
        FilterChange {
            classifications: self.active.iter().cloned().collect(),
        }
    }
}

//! The authoritative in-memory graph of lines, chambers and carriers.
//!
//! [`ProcessState`] is plain data: it does no locking of its own. The
//! [`Engine`](crate::engine::Engine) owns it behind a single mutex so that
//! ticks and control operations never interleave.
//!
//! Chamber occupancy is derived from carrier locations. The `cart_ids`
//! list on each chamber is a mirror kept in sync by the mutation helpers
//! here and is what the dashboard renders.

use std::collections::BTreeSet;

use autoline_types::{Cart, CartId, Chamber, ChamberId, Line, LineId, LinePatch, Polarity};

use crate::error::StoreError;

/// Position of a chamber within the line graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChamberPosition {
    /// Index of the owning line.
    pub line: usize,
    /// Which sequence the chamber sits in.
    pub polarity: Polarity,
    /// Ordinal within that sequence.
    pub ordinal: usize,
}

/// Lines with their chambers plus every carrier on them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessState {
    lines: Vec<Line>,
    carts: Vec<Cart>,
}

impl ProcessState {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            carts: Vec::new(),
        }
    }

    /// Insert a line.
    ///
    /// Rejects lines without chambers on either side and chamber or line
    /// ids that are already in use.
    pub fn add_line(&mut self, line: Line) -> Result<(), StoreError> {
        for polarity in Polarity::ALL {
            if line.chambers(polarity).is_empty() {
                return Err(StoreError::EmptySequence {
                    line: line.id,
                    polarity: polarity.key(),
                });
            }
        }
        if self.lines.iter().any(|l| l.id == line.id) {
            return Err(StoreError::DuplicateLine(line.id));
        }

        let mut seen: BTreeSet<&ChamberId> = self
            .lines
            .iter()
            .flat_map(Line::all_chambers)
            .map(|c| &c.id)
            .collect();
        for chamber in line.all_chambers() {
            if !seen.insert(&chamber.id) {
                return Err(StoreError::DuplicateChamber(chamber.id.clone()));
            }
        }

        self.lines.push(line);
        Ok(())
    }

    /// All lines.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// All carriers.
    pub fn carts(&self) -> &[Cart] {
        &self.carts
    }

    /// Apply a rename and/or replacement chamber sequences to a line.
    ///
    /// Validation runs before anything changes: replacement sequences must
    /// be non-empty, chamber ids stay unique across all lines, and a
    /// chamber holding carriers may not leave its sequence. Returns the
    /// edited line.
    pub fn update_line(&mut self, id: &LineId, patch: LinePatch) -> Result<Line, StoreError> {
        let line = self
            .line(id)
            .ok_or_else(|| StoreError::UnknownLine(id.clone()))?;

        for polarity in Polarity::ALL {
            let Some(replacement) = replacement(&patch, polarity) else {
                continue;
            };
            if replacement.is_empty() {
                return Err(StoreError::EmptySequence {
                    line: id.clone(),
                    polarity: polarity.key(),
                });
            }
            let current = line.chambers(polarity);
            let dropped = current.iter().find(|c| {
                self.occupancy(&c.id, None) > 0 && !replacement.iter().any(|r| r.id == c.id)
            });
            if let Some(chamber) = dropped {
                return Err(StoreError::ChamberInUse(chamber.id.clone()));
            }
        }

        let mut seen = BTreeSet::new();
        let others = self
            .lines
            .iter()
            .filter(|l| &l.id != id)
            .flat_map(Line::all_chambers);
        let edited = Polarity::ALL.into_iter().flat_map(|polarity| {
            replacement(&patch, polarity)
                .unwrap_or_else(|| line.chambers(polarity))
        });
        for chamber in others.chain(edited) {
            if !seen.insert(&chamber.id) {
                return Err(StoreError::DuplicateChamber(chamber.id.clone()));
            }
        }

        let LinePatch {
            name,
            anode_chambers,
            cathode_chambers,
        } = patch;
        let carts = &self.carts;
        let line = self
            .lines
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| StoreError::UnknownLine(id.clone()))?;
        if let Some(name) = name {
            line.name = name;
        }
        let sequences = [
            (Polarity::Anode, anode_chambers),
            (Polarity::Cathode, cathode_chambers),
        ];
        for (polarity, sequence) in sequences {
            let Some(mut chambers) = sequence else {
                continue;
            };
            for chamber in &mut chambers {
                chamber.line_id = id.clone();
                chamber.polarity = polarity;
                chamber.cart_ids = carts
                    .iter()
                    .filter(|c| c.location_chamber_id == chamber.id)
                    .map(|c| c.id.clone())
                    .collect();
            }
            *line.chambers_mut(polarity) = chambers;
        }
        Ok(line.clone())
    }

    /// Remove a line.
    ///
    /// The last remaining line and lines still holding carriers are kept.
    pub fn remove_line(&mut self, id: &LineId) -> Result<Line, StoreError> {
        let index = self
            .lines
            .iter()
            .position(|l| &l.id == id)
            .ok_or_else(|| StoreError::UnknownLine(id.clone()))?;
        if self.lines.len() == 1 {
            return Err(StoreError::LastLine);
        }
        let occupied = self
            .lines
            .get(index)
            .into_iter()
            .flat_map(Line::all_chambers)
            .find(|c| self.occupancy(&c.id, None) > 0);
        if let Some(chamber) = occupied {
            return Err(StoreError::ChamberInUse(chamber.id.clone()));
        }
        Ok(self.lines.remove(index))
    }

    /// Copy a line under `new_id`.
    ///
    /// The copy is named `"<name> (Copy)"`, its chamber ids are prefixed
    /// with `new_id` and it starts without carriers.
    pub fn duplicate_line(&mut self, id: &LineId, new_id: LineId) -> Result<Line, StoreError> {
        let source = self
            .line(id)
            .ok_or_else(|| StoreError::UnknownLine(id.clone()))?;
        let mut copy = source.clone();
        copy.name = format!("{} (Copy)", source.name);
        for chamber in copy.all_chambers_mut() {
            chamber.id = ChamberId::new(format!("{new_id}-{}", chamber.id));
            chamber.line_id = new_id.clone();
            chamber.cart_ids.clear();
        }
        copy.id = new_id;
        self.add_line(copy.clone())?;
        Ok(copy)
    }

    /// Split borrow of lines and carriers for the tick.
    pub fn split_mut(&mut self) -> (&mut [Line], &mut [Cart]) {
        (&mut self.lines, &mut self.carts)
    }

    /// Look up a line.
    pub fn line(&self, id: &LineId) -> Option<&Line> {
        self.lines.iter().find(|l| &l.id == id)
    }

    /// Look up a chamber in any line.
    pub fn chamber(&self, id: &ChamberId) -> Option<&Chamber> {
        self.lines
            .iter()
            .flat_map(Line::all_chambers)
            .find(|c| &c.id == id)
    }

    /// Look up a chamber in any line, mutably.
    pub fn chamber_mut(&mut self, id: &ChamberId) -> Option<&mut Chamber> {
        self.lines
            .iter_mut()
            .flat_map(Line::all_chambers_mut)
            .find(|c| &c.id == id)
    }

    /// Resolve where a chamber sits in the line graph.
    pub fn position(&self, id: &ChamberId) -> Option<ChamberPosition> {
        self.lines.iter().enumerate().find_map(|(line, l)| {
            [Polarity::Anode, Polarity::Cathode]
                .into_iter()
                .find_map(|polarity| {
                    l.chambers(polarity)
                        .iter()
                        .position(|c| &c.id == id)
                        .map(|ordinal| ChamberPosition {
                            line,
                            polarity,
                            ordinal,
                        })
                })
        })
    }

    /// Chamber at a position, if the position is inside its sequence.
    pub fn chamber_at(&self, position: ChamberPosition) -> Option<&Chamber> {
        self.lines
            .get(position.line)
            .and_then(|l| l.chambers(position.polarity).get(position.ordinal))
    }

    /// Look up a carrier.
    pub fn cart(&self, id: &CartId) -> Option<&Cart> {
        self.carts.iter().find(|c| &c.id == id)
    }

    /// Look up a carrier, mutably.
    pub fn cart_mut(&mut self, id: &CartId) -> Option<&mut Cart> {
        self.carts.iter_mut().find(|c| &c.id == id)
    }

    /// Number of carriers located in `chamber`, not counting `excluding`.
    pub fn occupancy(&self, chamber: &ChamberId, excluding: Option<&CartId>) -> usize {
        self.carts
            .iter()
            .filter(|c| &c.location_chamber_id == chamber)
            .filter(|c| excluding.is_none_or(|id| &c.id != id))
            .count()
    }

    /// Add a carrier and register it with its chamber.
    ///
    /// The caller has already checked that the chamber exists and has room.
    pub fn insert_cart(&mut self, cart: Cart) {
        let cart_id = cart.id.clone();
        let location = cart.location_chamber_id.clone();
        self.carts.push(cart);
        if let Some(chamber) = self.chamber_mut(&location) {
            chamber.cart_ids.push(cart_id);
        }
    }

    /// Remove a carrier and unregister it from its chamber.
    pub fn remove_cart(&mut self, id: &CartId) -> Option<Cart> {
        let index = self.carts.iter().position(|c| &c.id == id)?;
        let cart = self.carts.remove(index);
        if let Some(chamber) = self.chamber_mut(&cart.location_chamber_id) {
            chamber.cart_ids.retain(|c| c != id);
        }
        Some(cart)
    }

    /// Move a carrier's occupancy registration between chambers.
    pub fn relocate_cart(&mut self, id: &CartId, from: &ChamberId, to: &ChamberId) {
        if let Some(chamber) = self.chamber_mut(from) {
            chamber.cart_ids.retain(|c| c != id);
        }
        if let Some(chamber) = self.chamber_mut(to) {
            if !chamber.cart_ids.contains(id) {
                chamber.cart_ids.push(id.clone());
            }
        }
        if let Some(cart) = self.cart_mut(id) {
            cart.location_chamber_id = to.clone();
        }
    }
}

fn replacement(patch: &LinePatch, polarity: Polarity) -> Option<&[Chamber]> {
    match polarity {
        Polarity::Anode => patch.anode_chambers.as_deref(),
        Polarity::Cathode => patch.cathode_chambers.as_deref(),
    }
}

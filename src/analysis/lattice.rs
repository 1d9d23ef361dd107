/*
 * shae: analyse GPU shader ISA dumps.
 * Copyright (C) 2022  Ruifeng Xie
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! (Semi-)Lattice for data flow analysis.

use std::collections::BTreeSet;

/// Semi-lattice with a `⊔` operation.
///
/// # Note
/// This trait does not require a [`PartialOrd`], because the partial order implied by the
/// semi-lattice structure is usually different from the `#[derive(PartialOrd)]` order: e.g. for
/// sets, the former is set inclusion, while [`PartialOrd`] for [`BTreeSet`] is in fact a total
/// (lexicographical) order. Only the join operation matters for the fixpoint iteration anyway.
pub trait JoinSemiLattice {
    /// The `⊥` element for this semi-lattice: `⊥ ⊔ x = x`.
    fn bottom() -> Self;
    /// Update `self` to `self ⊔ other`, returning whether or not the value becomes different.
    fn join_assign(&mut self, other: &Self) -> bool;
    /// Join all of `others` into `self`, returning whether or not the value becomes different.
    fn join_assign_many<'a>(&mut self, others: impl Iterator<Item=&'a Self>) -> bool
        where Self: Sized + 'a {
        let mut changed = false;
        for other in others {
            changed |= self.join_assign(other);
        }
        changed
    }
}

impl<T: Ord + Clone> JoinSemiLattice for BTreeSet<T> {
    fn bottom() -> Self { BTreeSet::new() }
    fn join_assign(&mut self, other: &Self) -> bool {
        let old_len = self.len();
        self.extend(other.iter().cloned());
        self.len() != old_len
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use super::JoinSemiLattice;

    #[test]
    fn test_set_join() {
        let mut x: BTreeSet<u32> = JoinSemiLattice::bottom();
        assert!(x.join_assign(&BTreeSet::from([1, 2])));
        assert!(!x.join_assign(&BTreeSet::from([2])));
        assert!(!x.join_assign(&BTreeSet::bottom()));
        let others = [BTreeSet::from([3]), BTreeSet::from([1])];
        assert!(x.join_assign_many(others.iter()));
        assert_eq!(x, BTreeSet::from([1, 2, 3]));
    }
}

/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

macro_rules! define_index {
    ($ix:ident, $storage:ident, $elem:ident) => {
        define_index!($ix);

        /// Arena of
        #[doc = concat!("`", stringify!($elem), "`")]
        /// entries addressed by
        #[doc = concat!("`", stringify!($ix), "`.")]
        #[derive(Clone, Debug, Default)]
        pub struct $storage {
            storage: Vec<$elem>,
        }

        impl $storage {
            #[inline(always)]
            pub fn with_capacity(n: usize) -> Self {
                Self {
                    storage: Vec::with_capacity(n),
                }
            }

            #[inline(always)]
            pub fn push(&mut self, value: $elem) -> $ix {
                let idx = $ix(self.storage.len() as u32);
                self.storage.push(value);
                idx
            }
        }

        impl core::ops::Index<$ix> for $storage {
            type Output = $elem;

            #[inline(always)]
            fn index(&self, i: $ix) -> &Self::Output {
                &self.storage[i.index()]
            }
        }

        impl core::ops::IndexMut<$ix> for $storage {
            #[inline(always)]
            fn index_mut(&mut self, i: $ix) -> &mut Self::Output {
                &mut self.storage[i.index()]
            }
        }
    };

    ($ix:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(
            feature = "enable-serde",
            derive(::serde::Serialize, ::serde::Deserialize)
        )]
        pub struct $ix(pub u32);
        impl $ix {
            #[inline(always)]
            pub fn new(i: usize) -> Self {
                Self(i as u32)
            }
            #[inline(always)]
            pub fn index(self) -> usize {
                debug_assert!(self.is_valid());
                self.0 as usize
            }
            #[inline(always)]
            pub fn invalid() -> Self {
                Self(u32::MAX)
            }
            #[inline(always)]
            pub fn is_invalid(self) -> bool {
                self == Self::invalid()
            }
            #[inline(always)]
            pub fn is_valid(self) -> bool {
                self != Self::invalid()
            }
            /// `None` for the invalid sentinel.
            #[inline(always)]
            pub fn valid(self) -> Option<$ix> {
                if self.is_valid() {
                    Some(self)
                } else {
                    None
                }
            }
        }
    };
}

#[cfg(test)]
mod test {
    define_index!(Slot, Slots, u64);

    #[test]
    fn test_storage() {
        let mut slots = Slots::with_capacity(4);
        let a = slots.push(10);
        let b = slots.push(20);
        assert_eq!(a, Slot::new(0));
        assert_eq!(b.index(), 1);
        slots[a] += 5;
        assert_eq!(slots[a], 15);
        assert_eq!(slots[b], 20);
    }

    #[test]
    fn test_invalid() {
        let slot = Slot::invalid();
        assert!(slot.is_invalid());
        assert_eq!(slot.valid(), None);
        assert_eq!(Slot::new(3).valid(), Some(Slot::new(3)));
    }
}

use core::ffi::c_int;

/// A fieldless enum exported as a C integer. Ordinals follow declaration
/// order, shifted by the boundary's configured offset.
pub trait Enumeration: Sized + Copy + 'static {
    const VARIANTS: &'static [Self];
    const NAMES: &'static [&'static str];

    fn ordinal(self) -> usize;

    fn name(self) -> &'static str {
        Self::NAMES[self.ordinal()]
    }

    fn to_int(self, offset: i32) -> c_int {
        self.ordinal() as c_int + offset
    }

    fn from_int(value: c_int, offset: i32) -> Option<Self> {
        let ordinal = value.checked_sub(offset)?;
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::VARIANTS.get(i).copied())
    }
}

/// Declares a fieldless enum together with its [`Enumeration`] impl.
#[macro_export]
macro_rules! enumeration {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::Enumeration for $name {
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];
            const NAMES: &'static [&'static str] = &[$(stringify!($variant)),+];

            fn ordinal(self) -> usize {
                self as usize
            }
        }
    };
}

enumeration! {
    /// Result of comparing two values across the boundary.
    pub enum Order {
        Less,
        Equal,
        Greater,
    }
}

impl From<std::cmp::Ordering> for Order {
    fn from(ordering: std::cmp::Ordering) -> Self {
        match ordering {
            std::cmp::Ordering::Less => Order::Less,
            std::cmp::Ordering::Equal => Order::Equal,
            std::cmp::Ordering::Greater => Order::Greater,
        }
    }
}

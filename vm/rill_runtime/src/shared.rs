//! Single-threaded shared-ownership cell used throughout the runtime.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// A reference-counted cell for values shared by handle.
///
/// Arrays, function values, and scopes are all shared-by-reference in the
/// single-threaded execution model: pushing an array onto the operand stack,
/// binding it to a second name, or reading it back out of a scope never
/// copies the elements. `Shared<T>` wraps `Rc<RefCell<T>>` so that every
/// such allocation goes through one factory method and the `Rc` never leaks
/// into signatures.
///
/// Not thread-safe; the VM owns its whole object graph on one thread.
#[repr(transparent)]
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T> Shared<T> {
    /// Allocate a new shared cell holding `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Shared(Rc::new(RefCell::new(value)))
    }

    /// Borrow the contents immutably.
    #[inline]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Borrow the contents mutably.
    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Whether two handles refer to the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Shared<T> {
    /// Clones the handle, not the contents.
    #[inline]
    fn clone(&self) -> Self {
        Shared(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&self.0).finish()
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}

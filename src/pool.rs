//! Object pools for the batch orchestrator and extractor (§5 Shared resources).
//!
//! Every checkout is returned to the pool on every exit path — success, error, or panic —
//! because the guard's [`Drop`] impl does the returning, not explicit caller bookkeeping.

use std::sync::Mutex;

/// A bounded pool of reusable `T`s. `reset` is called on an object immediately before it is
/// handed back out, so a borrower never observes another borrower's leftover state.
pub struct Pool<T> {
    items: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    reset: Box<dyn Fn(&mut T) + Send + Sync>,
}

impl<T> Pool<T> {
    pub fn new(
        factory: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            reset: Box::new(reset),
        }
    }

    pub fn checkout(&self) -> Pooled<'_, T> {
        let mut item = self
            .items
            .lock()
            .expect("pool mutex poisoned")
            .pop()
            .unwrap_or_else(|| (self.factory)());
        (self.reset)(&mut item);
        Pooled {
            pool: self,
            item: Some(item),
        }
    }

    fn give_back(&self, item: T) {
        self.items.lock().expect("pool mutex poisoned").push(item);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items.lock().expect("pool mutex poisoned").len()
    }
}

/// RAII guard returned by [`Pool::checkout`]. Returns its item to the pool on drop regardless
/// of how the borrowing scope was exited.
pub struct Pooled<'a, T> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T> std::ops::Deref for Pooled<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.item.as_ref().expect("item taken before drop")
    }
}

impl<T> std::ops::DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("item taken before drop")
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.give_back(item);
        }
    }
}

/// Scratch buffer pool for the worklist-based expression-reference extraction in
/// `extractor::expr` — reused across calls to avoid reallocating a `Vec` per expression.
pub fn scratch_buffer_pool() -> Pool<Vec<sqlparser::ast::Expr>> {
    Pool::new(Vec::new, |v: &mut Vec<sqlparser::ast::Expr>| v.clear())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_returns_to_pool_on_drop() {
        let pool: Pool<Vec<i32>> = Pool::new(Vec::new, |v| v.clear());
        {
            let mut guard = pool.checkout();
            guard.push(1);
            guard.push(2);
        }
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn reset_clears_state_between_borrows() {
        let pool: Pool<Vec<i32>> = Pool::new(Vec::new, |v| v.clear());
        {
            let mut guard = pool.checkout();
            guard.push(42);
        }
        let guard = pool.checkout();
        assert!(guard.is_empty());
    }

    #[test]
    fn returns_to_pool_even_on_early_return_via_question_mark() {
        fn uses_pool(pool: &Pool<Vec<i32>>) -> Result<(), ()> {
            let mut guard = pool.checkout();
            guard.push(1);
            Err(())?;
            Ok(())
        }

        let pool: Pool<Vec<i32>> = Pool::new(Vec::new, |v| v.clear());
        let _ = uses_pool(&pool);
        assert_eq!(pool.len(), 1);
    }
}

//! Scalar field bindings.

use stowage_foundation::{Result, Value};

use crate::declare::Accessor;
use crate::value::ScalarValue;

/// Reads and writes one single-cell field of `T` as a semantic [`Value`].
pub(crate) trait ScalarAccess<T> {
    fn get(&self, instance: &T) -> Value;

    fn set(&self, instance: &mut T, value: &Value) -> Result<()>;
}

pub(crate) struct ScalarField<T, V> {
    accessor: Accessor<T, V>,
}

impl<T, V> ScalarField<T, V> {
    pub(crate) fn new(accessor: Accessor<T, V>) -> Self {
        Self { accessor }
    }
}

impl<T, V: ScalarValue> ScalarAccess<T> for ScalarField<T, V> {
    fn get(&self, instance: &T) -> Value {
        self.accessor.read(instance).to_value()
    }

    fn set(&self, instance: &mut T, value: &Value) -> Result<()> {
        self.accessor.write(instance, V::from_value(value)?);
        Ok(())
    }
}

//! Parameter binding

use sqlgate_core::{ParamDirection, Parameter, Value};

/// Append `descriptors` to `target` in order.
///
/// An `InOut` descriptor without a value is bound as an explicit
/// [`Value::Null`] so the driver never substitutes a default of its own.
/// Nothing is dropped, reordered or deduplicated, and the parameters already
/// in `target` are left untouched.
pub fn attach_parameters(target: &mut Vec<Parameter>, descriptors: &[Parameter]) {
    target.reserve(descriptors.len());
    for descriptor in descriptors {
        let mut parameter = descriptor.clone();
        if parameter.direction == ParamDirection::InOut && parameter.value.is_none() {
            parameter.value = Some(Value::Null);
        }
        target.push(parameter);
    }
}

/// Positional driver arguments for a bound parameter list
pub fn arguments(parameters: &[Parameter]) -> Vec<Value> {
    parameters.iter().map(Parameter::effective_value).collect()
}

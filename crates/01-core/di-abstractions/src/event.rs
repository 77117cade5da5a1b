//! 事件类型

use crate::binding::TypeBinding;

/// 可以被触发的事件
///
/// 事件的类型闭包由事件类型自身、通用类型和 [`Event::supertypes`]
/// 声明的类型组成；观察者观察的类型必须在闭包中
pub trait Event: Send + Sync + 'static {
    /// 事件实现的其它类型
    fn supertypes() -> Vec<TypeBinding>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

/// 计算事件的类型闭包
pub fn event_closure<E: Event>() -> Vec<TypeBinding> {
    let mut closure = vec![TypeBinding::identity::<E>(), TypeBinding::object()];
    closure.extend(E::supertypes());
    closure
}

impl Event for String {}

#[cfg(test)]
mod tests {
    use super::*;
    use di_common::TypeKey;
    use std::sync::Arc;

    trait Audit: Send + Sync {}

    struct LoginEvent;

    impl Audit for LoginEvent {}

    impl Event for LoginEvent {
        fn supertypes() -> Vec<TypeBinding> {
            vec![TypeBinding::upcast::<Self, dyn Audit>(|event| event as Arc<dyn Audit>)]
        }
    }

    #[test]
    fn test_event_closure_contains_supertypes() {
        let keys: Vec<TypeKey> = event_closure::<LoginEvent>()
            .iter()
            .map(TypeBinding::key)
            .collect();
        assert_eq!(
            keys,
            vec![
                TypeKey::of::<LoginEvent>(),
                TypeKey::object(),
                TypeKey::of::<dyn Audit>()
            ]
        );
    }
}

//! 随机类型和限定符格上的解析性质
use di_abstractions::TypeBinding;
use di_common::{ContainerError, Marker, MarkerDefinition, ResolutionError, TypeKey};
use di_impl::{Container, SyntheticBean};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const COLORS: [&str; 3] = ["Red", "Green", "Blue"];
const ROUNDS: usize = 64;

trait Cap0: Send + Sync {}
trait Cap1: Send + Sync {}
trait Cap2: Send + Sync {}

struct Node<const N: usize>;

impl<const N: usize> Cap0 for Node<N> {}
impl<const N: usize> Cap1 for Node<N> {}
impl<const N: usize> Cap2 for Node<N> {}

/// 备选状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Plain,
    /// 没有优先级的备选，未启用
    Disabled,
    Enabled(i64),
}

/// 生成的 Bean：实现的能力、声明的颜色限定符和备选状态
struct Generated {
    type_name: &'static str,
    caps: [bool; 3],
    colors: Vec<&'static str>,
    selection: Selection,
}

impl Generated {
    fn is_alternative(&self) -> bool {
        self.selection != Selection::Plain
    }

    fn priority(&self) -> Option<i64> {
        match self.selection {
            Selection::Enabled(priority) => Some(priority),
            _ => None,
        }
    }
}

fn node<const N: usize>(rng: &mut StdRng) -> (SyntheticBean, Generated) {
    let caps = [rng.gen_bool(0.6), rng.gen_bool(0.6), rng.gen_bool(0.6)];
    let colors: Vec<&'static str> = COLORS.iter().copied().filter(|_| rng.gen_bool(0.4)).collect();

    let mut bean = SyntheticBean::new(|| Ok(Node::<N>));
    if caps[0] {
        bean = bean.with_binding(TypeBinding::upcast::<Node<N>, dyn Cap0>(|node| node as Arc<dyn Cap0>));
    }
    if caps[1] {
        bean = bean.with_binding(TypeBinding::upcast::<Node<N>, dyn Cap1>(|node| node as Arc<dyn Cap1>));
    }
    if caps[2] {
        bean = bean.with_binding(TypeBinding::upcast::<Node<N>, dyn Cap2>(|node| node as Arc<dyn Cap2>));
    }
    for color in &colors {
        bean = bean.qualifier(Marker::new(*color));
    }
    // 小范围优先级，制造同级备选
    let selection = match rng.gen_range(0..4) {
        0 => Selection::Disabled,
        1 => Selection::Enabled(rng.gen_range(1..=3)),
        _ => Selection::Plain,
    };
    match selection {
        Selection::Plain => {}
        Selection::Disabled => bean = bean.alternative(),
        Selection::Enabled(priority) => bean = bean.alternative().priority(priority),
    }
    let generated = Generated {
        type_name: std::any::type_name::<Node<N>>(),
        caps,
        colors,
        selection,
    };
    (bean, generated)
}

fn cap_key(cap: usize) -> TypeKey {
    match cap {
        0 => TypeKey::of::<dyn Cap0>(),
        1 => TypeKey::of::<dyn Cap1>(),
        _ => TypeKey::of::<dyn Cap2>(),
    }
}

/// 按定义计算候选集合：类型闭包包含请求类型、限定符覆盖请求且已启用
fn expected_candidates<'a>(
    beans: &'a [Generated],
    cap: usize,
    required: &[&str],
    any: bool,
) -> Vec<&'a Generated> {
    beans
        .iter()
        .filter(|bean| bean.caps[cap])
        .filter(|bean| {
            if any {
                true
            } else if required.is_empty() {
                bean.colors.is_empty()
            } else {
                required.iter().all(|color| bean.colors.contains(color))
            }
        })
        .filter(|bean| bean.selection != Selection::Disabled)
        .collect()
}

/// 消歧：多个候选时备选胜出，唯一的最高优先级备选胜出
fn disambiguate(mut candidates: Vec<&Generated>) -> Vec<&Generated> {
    if candidates.len() > 1 && candidates.iter().any(|bean| bean.is_alternative()) {
        candidates.retain(|bean| bean.is_alternative());
    }
    if candidates.len() > 1 {
        if let Some(highest) = candidates.iter().filter_map(|bean| bean.priority()).max() {
            let top: Vec<&Generated> = candidates
                .iter()
                .copied()
                .filter(|bean| bean.priority() == Some(highest))
                .collect();
            if top.len() == 1 {
                candidates = top;
            }
        }
    }
    candidates
}

#[test]
fn test_resolution_matches_lattice_definition() {
    let mut selections = [0_usize; 3];
    let generators: [fn(&mut StdRng) -> (SyntheticBean, Generated); 6] =
        [node::<0>, node::<1>, node::<2>, node::<3>, node::<4>, node::<5>];

    for round in 0..ROUNDS {
        let mut rng = StdRng::seed_from_u64(0x5eed_0000 + round as u64);
        let count = rng.gen_range(1..=generators.len());

        let mut builder = Container::builder();
        for color in COLORS {
            builder = builder.declare_marker(MarkerDefinition::qualifier(color));
        }
        let mut generated = Vec::new();
        for generate in &generators[..count] {
            let (bean, facts) = generate(&mut rng);
            selections[match facts.selection {
                Selection::Plain => 0,
                Selection::Disabled => 1,
                Selection::Enabled(_) => 2,
            }] += 1;
            builder = builder.add_bean(bean);
            generated.push(facts);
        }
        let container = builder.build().unwrap();

        for cap in 0..3 {
            let mut requests: Vec<(Vec<&str>, bool)> = vec![(Vec::new(), false), (Vec::new(), true)];
            for _ in 0..4 {
                let required: Vec<&str> = COLORS.iter().copied().filter(|_| rng.gen_bool(0.5)).collect();
                requests.push((required, false));
            }

            for (required, any) in requests {
                let mut qualifiers: Vec<Marker> = required.iter().map(|color| Marker::new(*color)).collect();
                if any {
                    qualifiers.push(Marker::any());
                }
                let expected = disambiguate(expected_candidates(&generated, cap, &required, any));
                let result = container.resolve(cap_key(cap), &qualifiers);

                match (expected.as_slice(), result) {
                    ([], Err(ContainerError::Resolution(ResolutionError::Unsatisfied { .. }))) => {}
                    ([only], Ok(bean)) => {
                        assert_eq!(bean.type_name(), only.type_name, "round {} cap {}", round, cap);
                        assert_eq!(bean.is_alternative(), only.is_alternative());
                        assert_eq!(bean.priority(), only.priority());
                        assert!(bean.has_type(cap_key(cap)));
                        assert!(required.iter().all(|color| bean.qualifiers().iter().any(|q| q.is(color))));
                    }
                    (candidates, Err(ContainerError::Resolution(ResolutionError::Ambiguous { candidates: found, .. })))
                        if candidates.len() > 1 =>
                    {
                        assert_eq!(found.len(), candidates.len(), "round {} cap {}", round, cap);
                    }
                    (candidates, other) => panic!(
                        "round {} cap {} qualifiers {:?}: expected {} candidates, got {:?}",
                        round,
                        cap,
                        required,
                        candidates.len(),
                        other.map(|bean| bean.to_string())
                    ),
                }
            }
        }
    }
    assert!(selections.iter().all(|count| *count > 0), "{:?}", selections);
}

//! Centralized integration tests for di-impl crate
use di_abstractions::{
    params, AnnotatedType, ComponentType, Dependency, Event, FieldMember, HierarchyLevel,
    InitializerMember, InterceptionKind, Intercepted, ObserverMember,
};
use di_common::{
    builtin, BoxError, BoxedValue, ContainerError, DeploymentProblem, Marker, MarkerDefinition,
    ResolutionError, TypeKey,
};
use di_abstractions::BeansDescriptor;
use di_impl::{
    AfterBeanDiscovery, AfterDeploymentValidation, Container, Extension, SyntheticBean,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn same_instance<T: ?Sized>(left: &Arc<T>, right: &Arc<T>) -> bool {
    Arc::as_ptr(left) as *const () == Arc::as_ptr(right) as *const ()
}

/// 日志服务
trait Logger: Send + Sync {
    fn prefix(&self) -> &'static str;
}

#[derive(Default)]
struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn prefix(&self) -> &'static str {
        "console"
    }
}

#[derive(Default)]
struct FileLogger;

impl Logger for FileLogger {
    fn prefix(&self) -> &'static str {
        "file"
    }
}

struct Greeter {
    logger: Arc<dyn Logger>,
}

impl Greeter {
    fn greet(&self, name: &str) -> String {
        format!("[{}] hello, {}", self.logger.prefix(), name)
    }
}

fn logger_type<L: Logger + Default + 'static>() -> Arc<dyn AnnotatedType> {
    ComponentType::builder::<L>()
        .marker(Marker::application_scoped())
        .implements::<dyn Logger>(|logger| logger as Arc<dyn Logger>)
        .with_default()
        .build()
}

fn greeter_type() -> Arc<dyn AnnotatedType> {
    ComponentType::builder::<Greeter>()
        .marker(Marker::dependent())
        .inject_constructor(vec![Dependency::of::<dyn Logger>()], |args| {
            Ok(Greeter {
                logger: args.reference::<dyn Logger>(0)?,
            })
        })
        .build()
}

#[test]
fn test_greeter_receives_sole_logger() -> anyhow::Result<()> {
    let container = Container::builder()
        .add_type(logger_type::<ConsoleLogger>())
        .add_type(greeter_type())
        .build()?;

    let bean = container.resolve(TypeKey::of::<Greeter>(), &[])?;
    assert_eq!(bean.type_name(), std::any::type_name::<Greeter>());

    let greeter = container.select::<Greeter>(&[])?;
    let logger = container.select::<dyn Logger>(&[])?;
    assert!(same_instance(&greeter.logger, &logger));
    assert_eq!(greeter.greet("weave"), "[console] hello, weave");
    Ok(())
}

#[test]
fn test_two_loggers_are_ambiguous() {
    let container = Container::builder()
        .add_type(logger_type::<ConsoleLogger>())
        .add_type(logger_type::<FileLogger>())
        .build()
        .unwrap();

    match container.resolve(TypeKey::of::<dyn Logger>(), &[]) {
        Err(ContainerError::Resolution(ResolutionError::Ambiguous { candidates, .. })) => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected ambiguous resolution, got {:?}", other.map(|bean| bean.to_string())),
    }
    assert_eq!(container.select_all::<dyn Logger>(&[]).unwrap().len(), 2);
}

#[test]
fn test_ambiguous_injection_point_fails_deployment() {
    let result = Container::builder()
        .add_type(logger_type::<ConsoleLogger>())
        .add_type(logger_type::<FileLogger>())
        .add_type(greeter_type())
        .build();

    let error = result.err().expect("deployment should fail");
    assert!(matches!(error, ContainerError::DeploymentFailed { .. }));
    assert!(matches!(
        error.problems(),
        [DeploymentProblem::Resolution { source, injection_point }]
            if source.is_ambiguous() && injection_point.contains("Greeter")
    ));
}

#[test]
fn test_enabled_alternative_resolves_ambiguity() {
    let container = Container::builder()
        .with_descriptor(BeansDescriptor::new().enable_alternative("FileLogger"))
        .add_type(logger_type::<ConsoleLogger>())
        .add_type(
            ComponentType::builder::<FileLogger>()
                .marker(Marker::application_scoped())
                .marker(Marker::alternative())
                .implements::<dyn Logger>(|logger| logger as Arc<dyn Logger>)
                .with_default()
                .build(),
        )
        .add_type(greeter_type())
        .build()
        .unwrap();

    let greeter = container.select::<Greeter>(&[]).unwrap();
    assert_eq!(greeter.greet("weave"), "[file] hello, weave");
}

#[test]
fn test_registering_known_type_is_idempotent() {
    let container = Container::builder()
        .add_type(logger_type::<ConsoleLogger>())
        .add_type(logger_type::<ConsoleLogger>())
        .build()
        .unwrap();

    let stats = container.stats();
    assert_eq!(stats.registered_types, 1);
    assert_eq!(stats.beans, 1);

    let registry = container.registry();
    let first = registry.register(logger_type::<ConsoleLogger>());
    let second = registry.register(logger_type::<ConsoleLogger>());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    assert_eq!(container.beans().len(), 1);
}

#[derive(Default)]
struct Clock;

struct Layered {
    clock: Option<Arc<Clock>>,
}

fn record(level: HierarchyLevel, name: &'static str, log: &Log) -> HierarchyLevel {
    let init_log = Arc::clone(log);
    let ready_log = Arc::clone(log);
    level
        .initializer(InitializerMember::new::<Layered, _>(
            format!("init_{}", name),
            Vec::new(),
            move |_, _| {
                init_log.lock().push(format!("init:{}", name));
                Ok(())
            },
        ))
        .post_construct::<Layered, _>(format!("ready_{}", name), move |layered| {
            assert!(layered.clock.is_some());
            ready_log.lock().push(format!("ready:{}", name));
            Ok(())
        })
}

#[test]
fn test_post_construct_runs_ancestor_first_after_injection() {
    let log = log();
    let (root, base, middle, own) = (log.clone(), log.clone(), log.clone(), log.clone());
    let layered = ComponentType::builder::<Layered>()
        .marker(Marker::singleton())
        .no_args(|| Layered { clock: None })
        .ancestor(3, "Root", move |level| {
            record(level, "Root", &root).field(FieldMember::new::<Layered, Clock>("clock", |layered| {
                &mut layered.clock
            }))
        })
        .ancestor(2, "Base", move |level| record(level, "Base", &base))
        .ancestor(1, "Middle", move |level| record(level, "Middle", &middle))
        .members(move |level| record(level, "Layered", &own))
        .build();

    let container = Container::builder()
        .add_type(ComponentType::builder::<Clock>().marker(Marker::singleton()).with_default().build())
        .add_type(layered)
        .build()
        .unwrap();
    container.select::<Layered>(&[]).unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "init:Root",
            "init:Base",
            "init:Middle",
            "init:Layered",
            "ready:Root",
            "ready:Base",
            "ready:Middle",
            "ready:Layered",
        ]
    );
}

struct Slow;

#[test]
fn test_concurrent_first_lookups_construct_once() {
    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);
    const THREADS: usize = 8;

    let container = Container::builder()
        .add_type(
            ComponentType::builder::<Slow>()
                .marker(Marker::singleton())
                .no_args(|| {
                    CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    Slow
                })
                .build(),
        )
        .build()
        .unwrap();

    let barrier = Barrier::new(THREADS);
    let references: Vec<Arc<Slow>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    container.select::<Slow>(&[]).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
    assert_eq!(references.len(), THREADS);
    assert!(references.iter().all(|reference| Arc::ptr_eq(reference, &references[0])));
    assert_eq!(container.stats().created_instances, 1);
}

const AUDITED: &str = "Audited";

trait Ledger: Send + Sync {
    fn deposit(&self, amount: i64) -> Result<i64, BoxError>;
}

struct Account {
    log: Log,
}

impl Ledger for Account {
    fn deposit(&self, amount: i64) -> Result<i64, BoxError> {
        self.log.lock().push("target".to_string());
        Ok(amount)
    }
}

struct LedgerProxy(Intercepted<Account>);

impl Ledger for LedgerProxy {
    fn deposit(&self, amount: i64) -> Result<i64, BoxError> {
        self.0.invoke("deposit", params![amount], |account, ctx| {
            account.deposit(*ctx.parameter::<i64>(0)?)
        })
    }
}

fn account_type(log: &Log) -> Arc<dyn AnnotatedType> {
    let log = Arc::clone(log);
    ComponentType::builder::<Account>()
        .marker(Marker::application_scoped())
        .marker(Marker::new(AUDITED))
        .intercepted_as::<dyn Ledger>(
            |account| account as Arc<dyn Ledger>,
            |handle| Arc::new(LedgerProxy(handle)) as Arc<dyn Ledger>,
        )
        .no_args(move || Account {
            log: Arc::clone(&log),
        })
        .build()
}

fn auditor<I: Default + Send + Sync + 'static>(
    label: &'static str,
    priority: Option<i64>,
    proceed: bool,
    log: &Log,
) -> Arc<dyn AnnotatedType> {
    let log = Arc::clone(log);
    let mut builder = ComponentType::builder::<I>()
        .marker(Marker::interceptor())
        .marker(Marker::new(AUDITED))
        .with_default()
        .members(move |level| {
            level.intercept::<I, _>(InterceptionKind::AroundInvoke, "around", move |_, ctx| {
                log.lock().push(label.to_string());
                if proceed {
                    ctx.proceed()
                } else {
                    Ok(Box::new(-1_i64) as BoxedValue)
                }
            })
        });
    if let Some(priority) = priority {
        builder = builder.marker(Marker::priority(priority));
    }
    builder.build()
}

#[derive(Default)]
struct P1;

#[derive(Default)]
struct P2;

#[derive(Default)]
struct D1;

#[test]
fn test_interceptor_order_priority_then_descriptor() {
    let log = log();
    let container = Container::builder()
        .declare_marker(MarkerDefinition::interceptor_binding(AUDITED))
        .with_descriptor(BeansDescriptor::new().enable_interceptor("D1"))
        .add_type(auditor::<P1>("P1", Some(100), true, &log))
        .add_type(auditor::<P2>("P2", Some(50), true, &log))
        .add_type(auditor::<D1>("D1", None, true, &log))
        .add_type(account_type(&log))
        .build()
        .unwrap();

    let ledger = container.select::<dyn Ledger>(&[]).unwrap();
    assert_eq!(ledger.deposit(5).unwrap(), 5);
    assert_eq!(*log.lock(), vec!["P2", "P1", "D1", "target"]);

    let bean = container.resolve(TypeKey::of::<Account>(), &[]).unwrap();
    let chain: Vec<String> = container
        .resolver()
        .resolve_interceptors(&bean, Some("deposit"), InterceptionKind::AroundInvoke)
        .iter()
        .map(|resolved| resolved.bean.type_name().rsplit("::").next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(chain, vec!["P2", "P1", "D1"]);
}

#[test]
fn test_short_circuit_skips_target() {
    let log = log();
    let container = Container::builder()
        .declare_marker(MarkerDefinition::interceptor_binding(AUDITED))
        .add_type(auditor::<P1>("A", Some(10), false, &log))
        .add_type(auditor::<P2>("B", Some(20), true, &log))
        .add_type(account_type(&log))
        .build()
        .unwrap();

    let ledger = container.select::<dyn Ledger>(&[]).unwrap();
    assert_eq!(ledger.deposit(5).unwrap(), -1);
    assert_eq!(*log.lock(), vec!["A"]);
}

#[test]
fn test_concrete_reference_bypasses_interceptors() {
    let log = log();
    let container = Container::builder()
        .declare_marker(MarkerDefinition::interceptor_binding(AUDITED))
        .add_type(auditor::<P1>("A", Some(10), true, &log))
        .add_type(account_type(&log))
        .build()
        .unwrap();

    let account = container.select::<Account>(&[]).unwrap();
    assert_eq!(account.deposit(3).unwrap(), 3);
    assert_eq!(*log.lock(), vec!["target"]);
}

/// 下单事件
#[derive(Debug, Clone)]
struct OrderPlaced {
    id: u32,
}

impl Event for OrderPlaced {}

struct Auditor {
    seen: Log,
}

fn auditor_bean(seen: &Log) -> Arc<dyn AnnotatedType> {
    let seen = Arc::clone(seen);
    ComponentType::builder::<Auditor>()
        .marker(Marker::application_scoped())
        .no_args(move || Auditor {
            seen: Arc::clone(&seen),
        })
        .members(|level| {
            level
                .observer(ObserverMember::new::<Auditor, OrderPlaced, _>(
                    "on_order",
                    |auditor, event| {
                        auditor.seen.lock().push(format!("sync:{}", event.id));
                        Ok(())
                    },
                ))
                .observer(
                    ObserverMember::new::<Auditor, OrderPlaced, _>("on_order_async", |auditor, event| {
                        auditor.seen.lock().push(format!("async:{}", event.id));
                        Ok(())
                    })
                    .asynchronous(),
                )
        })
        .build()
}

#[test]
fn test_bean_observers_receive_events() {
    let seen = log();
    let container = Container::builder().add_type(auditor_bean(&seen)).build().unwrap();

    assert_eq!(container.fire(OrderPlaced { id: 7 }, &[]).unwrap(), 1);
    assert_eq!(container.fire(OrderPlaced { id: 8 }, &[]).unwrap(), 1);
    assert_eq!(*seen.lock(), vec!["sync:7", "sync:8"]);
    assert_eq!(container.stats().observers, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_observers_run_on_blocking_pool() {
    let seen = log();
    let container = Container::builder().add_type(auditor_bean(&seen)).build().unwrap();

    let notified = container.fire_async(OrderPlaced { id: 9 }, &[]).await.unwrap();
    assert_eq!(notified, 1);
    assert_eq!(*seen.lock(), vec!["async:9"]);
}

#[derive(Default)]
struct Registrar {
    observed: Arc<AtomicUsize>,
}

struct Settings {
    name: &'static str,
}

impl Extension for Registrar {
    fn after_bean_discovery(
        &self,
        event: &mut AfterBeanDiscovery,
        container: &Container,
    ) -> Result<(), BoxError> {
        assert!(container.resolve(TypeKey::of::<dyn Logger>(), &[]).is_ok());
        let observed = Arc::clone(&self.observed);
        event
            .add_bean(SyntheticBean::from_instance(Arc::new(Settings { name: "weave" })).named("settings"))
            .add_observer(ObserverMember::new_static::<String, _>("count", move |_| {
                observed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        Ok(())
    }
}

#[test]
fn test_extension_contributes_beans_and_observers() {
    let extension = Arc::new(Registrar::default());
    let container = Container::builder()
        .add_type(logger_type::<ConsoleLogger>())
        .add_extension(Arc::clone(&extension) as Arc<dyn Extension>)
        .build()
        .unwrap();

    let settings = container.select_by_name::<Settings>("settings").unwrap();
    assert_eq!(settings.name, "weave");
    container.fire("ping".to_string(), &[]).unwrap();
    assert_eq!(extension.observed.load(Ordering::SeqCst), 1);
}

struct Gatekeeper;

impl Extension for Gatekeeper {
    fn after_deployment_validation(
        &self,
        event: &mut AfterDeploymentValidation,
        _container: &Container,
    ) -> Result<(), BoxError> {
        event.add_problem("licence missing");
        Err("second failure".into())
    }
}

#[test]
fn test_extension_problems_abort_deployment() {
    let result = Container::builder()
        .add_type(logger_type::<ConsoleLogger>())
        .add_extension(Arc::new(Gatekeeper))
        .build();

    let error = result.err().expect("deployment should fail");
    let messages: Vec<String> = error.problems().iter().map(ToString::to_string).collect();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("licence missing"));
    assert!(messages[1].contains("second failure"));
}

struct Session {
    id: usize,
}

#[test]
fn test_request_scope_follows_guard() {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let container = Container::builder()
        .add_type(
            ComponentType::builder::<Session>()
                .marker(Marker::request_scoped())
                .no_args(|| Session {
                    id: NEXT.fetch_add(1, Ordering::SeqCst),
                })
                .build(),
        )
        .build()
        .unwrap();

    assert!(container.select::<Session>(&[]).is_err());
    let first = {
        let _request = container.activate_request_context();
        let first = container.select::<Session>(&[]).unwrap();
        let again = container.select::<Session>(&[]).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        first.id
    };
    let second = {
        let _request = container.activate_request_context();
        container.select::<Session>(&[]).unwrap().id
    };
    assert_ne!(first, second);
    assert_eq!(container.stats().destroyed_instances, 2);
    assert_eq!(container.lifecycle().active_instances(builtin::REQUEST_SCOPED), 0);
}

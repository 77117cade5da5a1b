//! # 示例应用程序
//!
//! 演示如何使用 Lorn Weave 容器：设置加载、类型扫描、拦截器、
//! 备选 Bean、请求作用域和事件

use clap::Parser;
use di_abstractions::{
    params, AnnotatedType, ComponentType, Dependency, Event, InterceptionKind, Intercepted,
};
use di_common::{BoxError, Marker, MarkerLiteral};
use di_composition::{ContainerBootstrapper, LoggingConfig, SettingsLoader, StaticTypeScanner};
use di_impl::Container;
use di_macros::Marker;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "Lorn Weave 示例应用")]
struct Args {
    /// TOML 设置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 环境变量前缀
    #[arg(long, default_value = "WEAVE")]
    env_prefix: String,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 使用沙箱支付网关
    #[arg(long)]
    sandbox: bool,

    /// 下单数量
    #[arg(long, default_value_t = 3)]
    orders: u32,
}

/// 计时拦截器绑定
#[derive(Marker)]
#[marker(interceptor_binding)]
struct Timed;

/// 沙箱构造型
#[derive(Marker)]
#[marker(stereotype, carries(ApplicationScoped, Alternative))]
struct Sandbox;

trait PaymentGateway: Send + Sync {
    fn charge(&self, cents: i64) -> Result<String, BoxError>;
}

#[derive(Default)]
struct CardGateway;

impl PaymentGateway for CardGateway {
    fn charge(&self, cents: i64) -> Result<String, BoxError> {
        if cents <= 0 {
            return Err(format!("无效金额: {}", cents).into());
        }
        Ok(format!("card-{}", cents))
    }
}

struct CardGatewayProxy(Intercepted<CardGateway>);

impl PaymentGateway for CardGatewayProxy {
    fn charge(&self, cents: i64) -> Result<String, BoxError> {
        self.0.invoke("charge", params![cents], |gateway, ctx| {
            gateway.charge(*ctx.parameter::<i64>(0)?)
        })
    }
}

#[derive(Default)]
struct SandboxGateway;

impl PaymentGateway for SandboxGateway {
    fn charge(&self, cents: i64) -> Result<String, BoxError> {
        Ok(format!("sandbox-{}", cents))
    }
}

#[derive(Default)]
struct TimingInterceptor;

/// 单次请求内的收据
#[derive(Default)]
struct Receipt {
    lines: Mutex<Vec<String>>,
}

struct OrderService {
    gateway: Arc<dyn PaymentGateway>,
}

impl OrderService {
    fn place(&self, receipt: &Receipt, id: u32, cents: i64) -> Result<OrderPlaced, BoxError> {
        let reference = self.gateway.charge(cents)?;
        receipt.lines.lock().push(format!("订单 {} -> {}", id, reference));
        Ok(OrderPlaced { id, reference })
    }
}

/// 下单事件
#[derive(Debug, Clone)]
struct OrderPlaced {
    id: u32,
    reference: String,
}

impl Event for OrderPlaced {}

fn catalog() -> StaticTypeScanner {
    let types: Vec<Arc<dyn AnnotatedType>> = vec![
        ComponentType::builder::<CardGateway>()
            .marker(Marker::application_scoped())
            .marker(Timed.to_marker())
            .intercepted_as::<dyn PaymentGateway>(
                |gateway| gateway as Arc<dyn PaymentGateway>,
                |handle| Arc::new(CardGatewayProxy(handle)) as Arc<dyn PaymentGateway>,
            )
            .with_default()
            .build(),
        ComponentType::builder::<SandboxGateway>()
            .marker(Sandbox.to_marker())
            .implements::<dyn PaymentGateway>(|gateway| gateway as Arc<dyn PaymentGateway>)
            .with_default()
            .build(),
        ComponentType::builder::<TimingInterceptor>()
            .marker(Marker::interceptor())
            .marker(Marker::priority(100))
            .marker(Timed.to_marker())
            .with_default()
            .members(|level| {
                level.intercept::<TimingInterceptor, _>(
                    InterceptionKind::AroundInvoke,
                    "time",
                    |_, ctx| {
                        let started = Instant::now();
                        let result = ctx.proceed();
                        info!("{} 耗时 {:?}", ctx.method(), started.elapsed());
                        result
                    },
                )
            })
            .build(),
        ComponentType::builder::<Receipt>()
            .marker(Marker::request_scoped())
            .with_default()
            .build(),
        ComponentType::builder::<OrderService>()
            .marker(Marker::application_scoped())
            .inject_constructor(vec![Dependency::of::<dyn PaymentGateway>()], |args| {
                Ok(OrderService {
                    gateway: args.reference::<dyn PaymentGateway>(0)?,
                })
            })
            .build(),
    ];
    StaticTypeScanner::new("example-app").with_types(types)
}

async fn build_container(args: &Args) -> anyhow::Result<Container> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = &args.config {
        loader = loader.add_toml(path)?;
    }
    let mut settings = loader.add_env_vars(&args.env_prefix).load()?;
    settings.logging = LoggingConfig {
        enabled: true,
        level: args.log_level.clone(),
        ..settings.logging
    };
    if args.sandbox {
        settings.beans = settings.beans.enable_alternative(Sandbox::KIND);
    }

    let container = ContainerBootstrapper::new()
        .with_settings(settings)
        .add_type_scanner(Arc::new(catalog()))
        .configure(|builder| {
            builder
                .declare_literal::<Timed>()
                .declare_literal::<Sandbox>()
                .observe::<OrderPlaced, _>(Vec::new(), |event| {
                    info!("订单已支付: {} ({})", event.id, event.reference);
                    Ok(())
                })
                .observe_async::<OrderPlaced, _>(Vec::new(), |event| {
                    info!("异步通知已发送: {}", event.id);
                    Ok(())
                })
        })
        .bootstrap()
        .await?;
    Ok(container)
}

async fn place_orders(container: &Container, count: u32) -> anyhow::Result<()> {
    let service = container.select::<OrderService>(&[])?;

    for id in 1..=count {
        let _request = container.activate_request_context();
        let receipt = container.select::<Receipt>(&[])?;

        match service.place(&receipt, id, i64::from(id) * 1250) {
            Ok(event) => {
                container.fire(event.clone(), &[])?;
                container.fire_async(event, &[]).await?;
            }
            Err(e) => warn!("订单 {} 支付失败: {}", id, e),
        }
        for line in receipt.lines.lock().iter() {
            info!("{}", line);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let container = build_container(&args).await?;
    info!("启动 Lorn Weave 示例应用");

    place_orders(&container, args.orders).await?;

    let stats = container.stats();
    info!(
        "容器统计: {} 个 Bean, {} 个拦截器, 创建 {} 个实例, 销毁 {} 个实例",
        stats.beans, stats.interceptors, stats.created_instances, stats.destroyed_instances
    );

    container.shutdown();
    info!("应用已关闭");
    Ok(())
}

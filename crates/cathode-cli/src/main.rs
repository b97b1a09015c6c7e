use std::any::{Any, TypeId};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cathode_common::input::KeyCode;
use cathode_common::traits::Presentation;
use cathode_common::types::{CellFlags, Color, Rect};
use cathode_core::adapters::{TtyPresentation, UiWorkload};
use cathode_core::asciicast::RecorderFilter;
use cathode_core::{FilterChains, Mediator, RenderContext, Style};
use cathode_ui::bindings::KeyChord;
use cathode_ui::popup::PopupEntry;
use cathode_ui::widget::{Node, NodeBase, Widget};
use cathode_ui::widgets::Label;
use cathode_ui::{App, AppController};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cathode demo shell", long_about = None)]
struct Args {
    /// Enable debug logging (to stderr; best redirected to a file)
    #[arg(short, long)]
    debug: bool,

    /// Record the session as an asciicast v2 file
    #[arg(long)]
    record: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "cathode=debug" } else { "cathode=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let presentation = TtyPresentation::new()?;
    let size = presentation.size();
    let caps = presentation.capabilities();
    info!(width = size.width, height = size.height, "starting demo");

    let (workload, handle) = UiWorkload::new(caps);
    let cancel = CancellationToken::new();

    let mut filters = FilterChains::default();
    if let Some(path) = &args.record {
        let file = BufWriter::new(File::create(path)?);
        filters
            .workload_output
            .push(Box::new(RecorderFilter::new(file, size, None)?));
    }

    let app = App::new(handle, demo_root, cancel.clone());
    let mediator = Mediator::new(presentation, workload, cancel.clone()).with_filters(filters);

    let app_task = tokio::spawn(app.run());
    let session = mediator.run().await;

    cancel.cancel();
    app_task.await??;
    session?;
    Ok(())
}

fn demo_root(controller: &AppController) -> Box<dyn Widget> {
    Box::new(DemoShell {
        controller: controller.clone(),
    })
}

/// The demo screen: a banner, a help line, and a counter that a popup
/// can bump. `q` quits, `p` opens an anchored popup, Tab moves focus.
struct DemoShell {
    controller: AppController,
}

struct DemoShellNode {
    base: NodeBase,
    opened: Arc<AtomicUsize>,
}

impl Widget for DemoShell {
    fn node_type(&self) -> TypeId {
        TypeId::of::<DemoShellNode>()
    }

    fn create_node(&self) -> Box<dyn Node> {
        let mut base = NodeBase::new();
        let opened = Arc::new(AtomicUsize::new(0));

        let quit = self.controller.clone();
        base.bindings
            .bind_key(KeyChord::plain(KeyCode::Char('q')), Box::new(move || quit.quit()));

        let popups = self.controller.clone();
        let counter = Arc::clone(&opened);
        base.bindings.bind_key(
            KeyChord::plain(KeyCode::Char('p')),
            Box::new(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let inner = popups.clone();
                popups.push_popup(
                    PopupEntry::new(move || {
                        Box::new(Label::styled(
                            format!(" popup #{n} - Esc closes "),
                            Style {
                                fg: Some(Color::Palette(0)),
                                bg: Some(Color::Palette(6)),
                                flags: CellFlags::empty(),
                            },
                        ))
                    })
                    .anchored(Rect::new(4, 2, 1, 1))
                    .on_dismiss({
                        let inner = inner.clone();
                        move || inner.invalidate()
                    }),
                );
            }),
        );

        let blink = self.controller.clone();
        self.controller.add_interval(Duration::from_millis(800), move || {
            blink.invalidate();
        });

        Box::new(DemoShellNode { base, opened })
    }

    fn update_node(&self, _node: &mut dyn Node) {}
}

impl Node for DemoShellNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn focusable(&self) -> bool {
        true
    }

    fn render(&self, ctx: &mut RenderContext) {
        let clip = ctx.clip();
        ctx.set_style(Style {
            fg: Some(Color::Palette(14)),
            bg: None,
            flags: CellFlags::BOLD,
        });
        ctx.move_to(clip.x + 1, clip.y);
        ctx.print("cathode demo");

        ctx.set_style(Style::default());
        ctx.move_to(clip.x + 1, clip.y + 2);
        ctx.print("p: open popup   q: quit");

        ctx.move_to(clip.x + 1, clip.y + 4);
        ctx.print(&format!(
            "popups opened so far: {}",
            self.opened.load(Ordering::SeqCst)
        ));
    }
}

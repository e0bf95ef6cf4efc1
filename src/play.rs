#![cfg(feature = "play")]
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event as WinitEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use crate::engine::{Clock, Engine, SystemClock, TickOutcome};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

type Surface = softbuffer::Surface<Rc<Window>, Rc<Window>>;

/// Opens a resizable window and runs the reveal on the wall clock until the
/// fade completes. Escape or closing the window quits early.
pub fn run_play(mut engine: Engine, title: &str) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create play event loop")?;
    let window = Rc::new(
        WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(engine.width(), engine.height()))
            .with_resizable(true)
            .build(&event_loop)
            .context("failed to create preview window")?,
    );

    let context = softbuffer::Context::new(window.clone())
        .map_err(|error| anyhow!("failed to create softbuffer context: {error}"))?;
    let mut surface = Surface::new(&context, window.clone())
        .map_err(|error| anyhow!("failed to create softbuffer surface: {error}"))?;

    let mut clock = SystemClock::new();
    let mut next_redraw_at = Instant::now();
    let mut finished = false;

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Wait);

            match event {
                WinitEvent::WindowEvent { window_id, event } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested => target.exit(),
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.state == ElementState::Pressed
                                && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                            {
                                target.exit();
                            }
                        }
                        WindowEvent::Resized(size) => {
                            if size.width > 0 && size.height > 0 {
                                if let Err(error) = engine.resize(size.width, size.height) {
                                    error!("resize failed: {error:#}");
                                    target.exit();
                                    return;
                                }
                                window.request_redraw();
                            }
                        }
                        WindowEvent::RedrawRequested => {
                            if !finished && engine.tick(clock.now_ms()) == TickOutcome::Finished {
                                finished = true;
                                info!("reveal complete; press Escape to close");
                            }
                            if let Err(error) = present(&mut surface, &engine) {
                                error!("present failed: {error:#}");
                                target.exit();
                            }
                        }
                        _ => {}
                    }
                }
                WinitEvent::AboutToWait => {
                    if !finished {
                        let now = Instant::now();
                        if now >= next_redraw_at {
                            window.request_redraw();
                            next_redraw_at = now + FRAME_INTERVAL;
                        }
                        target.set_control_flow(ControlFlow::WaitUntil(next_redraw_at));
                    }
                }
                _ => {}
            }
        })
        .map_err(|error| anyhow!("play event loop terminated: {error}"))
}

fn present(surface: &mut Surface, engine: &Engine) -> Result<()> {
    let (Some(width), Some(height)) = (
        NonZeroU32::new(engine.width()),
        NonZeroU32::new(engine.height()),
    ) else {
        return Ok(());
    };
    surface
        .resize(width, height)
        .map_err(|error| anyhow!("failed to resize surface: {error}"))?;

    let mut buffer = surface
        .buffer_mut()
        .map_err(|error| anyhow!("failed to map surface buffer: {error}"))?;
    for (dst, px) in buffer.iter_mut().zip(engine.surface().chunks_exact(4)) {
        *dst = (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2]);
    }
    buffer
        .present()
        .map_err(|error| anyhow!("failed to present frame: {error}"))
}

//! Clear-color demo application.

use ash::vk;
use glam::Vec3;
use tracing::info;

use candela_app::{AppContext, CandelaApp, FrameContext};

/// Hue sweep speed in cycles per second.
const HUE_SPEED: f32 = 0.05;

/// Demo application cycling the clear color through the hue circle.
pub struct ClearDemo {
    elapsed: f32,
}

impl ClearDemo {
    fn clear_color(&self) -> Vec3 {
        let hue = (self.elapsed * HUE_SPEED).fract();
        hsv_to_rgb(hue, 0.6, 0.35)
    }
}

impl CandelaApp for ClearDemo {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        info!(
            "Clear demo ready: {}x{}, {} swapchain images",
            ctx.width(),
            ctx.height(),
            ctx.swapchain.image_count()
        );
        Ok(Self { elapsed: 0.0 })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.elapsed += dt;
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let color = self.clear_color();
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [color.x, color.y, color.z, 1.0],
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(ctx.window_pass.handle())
            .framebuffer(frame.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: frame.extent,
            })
            .clear_values(&clear_values);

        let device = ctx.device.device();
        // SAFETY: The command buffer is recording and the framebuffer was
        // built for this pass
        unsafe {
            device.cmd_begin_render_pass(frame.commands, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_end_render_pass(frame.commands);
        }

        Ok(())
    }

    fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        info!("Demo resized to {width}x{height}");
        Ok(())
    }
}

/// Convert an HSV color (all components in `[0, 1]`) to linear RGB.
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let h = h * 6.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match i as u32 % 6 {
        0 => Vec3::new(v, t, p),
        1 => Vec3::new(q, v, p),
        2 => Vec3::new(p, v, t),
        3 => Vec3::new(p, q, v),
        4 => Vec3::new(t, p, v),
        _ => Vec3::new(v, p, q),
    }
}

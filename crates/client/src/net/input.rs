use std::collections::HashSet;

use glam::Vec2;

use brawl::{Actions, Command, InputMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Left,
    Right,
    Up,
    Down,
    Jump,
    Fire,
}

/// Raw control state accumulated by the input collaborator between ticks.
#[derive(Debug, Clone)]
pub struct RawInput {
    held: HashSet<Control>,
    /// Pointer offset from the local entity, in world units.
    pointer: Option<Vec2>,
    focused: bool,
}

impl Default for RawInput {
    fn default() -> Self {
        Self {
            held: HashSet::new(),
            pointer: None,
            focused: true,
        }
    }
}

impl RawInput {
    pub fn set_control(&mut self, control: Control, pressed: bool) {
        if !self.focused {
            return;
        }
        if pressed {
            self.held.insert(control);
        } else {
            self.held.remove(&control);
        }
    }

    pub fn press(&mut self, control: Control) {
        self.set_control(control, true);
    }

    pub fn release(&mut self, control: Control) {
        self.set_control(control, false);
    }

    pub fn set_pointer(&mut self, offset: Option<Vec2>) {
        self.pointer = offset;
    }

    /// Releases are never delivered while unfocused, so everything held is
    /// dropped here rather than left stuck down.
    pub fn focus_lost(&mut self) {
        self.focused = false;
        self.held.clear();
        self.pointer = None;
    }

    pub fn focus_gained(&mut self) {
        self.focused = true;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_held(&self, control: Control) -> bool {
        self.focused && self.held.contains(&control)
    }

    fn axis(&self, negative: Control, positive: Control) -> f32 {
        let mut value = 0.0;
        if self.is_held(positive) {
            value += 1.0;
        }
        if self.is_held(negative) {
            value -= 1.0;
        }
        value
    }

    pub fn move_axes(&self) -> Vec2 {
        let axes = Vec2::new(
            self.axis(Control::Left, Control::Right),
            self.axis(Control::Down, Control::Up),
        );
        if axes.length_squared() > 1.0 {
            axes.normalize()
        } else {
            axes
        }
    }

    pub fn aim(&self) -> Vec2 {
        match self.pointer {
            Some(offset) if self.focused => offset.normalize_or_zero(),
            _ => Vec2::ZERO,
        }
    }
}

/// Stamps one command per simulation tick. Sequence numbers start at 1 so
/// that an acknowledgment of 0 means "nothing yet".
#[derive(Debug)]
pub struct InputSequencer {
    next_sequence: u32,
    next_tick: u32,
    jump_was_held: bool,
}

impl Default for InputSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSequencer {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            next_tick: 0,
            jump_was_held: false,
        }
    }

    /// Produces the command for the current tick. Never skips or merges:
    /// an idle tick still yields a command so the replay stream has no gaps.
    pub fn sample(&mut self, raw: &RawInput) -> Command {
        let mut input = InputMask::default();
        input.encode_axes(raw.move_axes().to_array());
        input.encode_aim(raw.aim().to_array());

        let jump_held = raw.is_held(Control::Jump);
        let mut actions = Actions::empty();
        if jump_held {
            actions |= Actions::JUMP_HELD;
            if !self.jump_was_held {
                actions |= Actions::JUMP;
            }
        }
        if raw.is_held(Control::Fire) {
            actions |= Actions::FIRE;
        }
        input.set_actions(actions);
        self.jump_was_held = jump_held;

        let command = Command::new(self.next_sequence, self.next_tick).with_input(input);
        self.next_sequence = self.next_sequence.wrapping_add(1).max(1);
        self.next_tick = self.next_tick.wrapping_add(1);
        command
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn next_tick(&self) -> u32 {
        self.next_tick
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tick_yields_one_sequential_command() {
        let mut sequencer = InputSequencer::new();
        let raw = RawInput::default();

        let commands: Vec<_> = (0..5).map(|_| sequencer.sample(&raw)).collect();

        for (i, command) in commands.iter().enumerate() {
            assert_eq!(command.sequence, i as u32 + 1);
            assert_eq!(command.tick, i as u32);
            assert!(command.input.is_idle());
        }
    }

    #[test]
    fn test_jump_is_edge_triggered() {
        let mut sequencer = InputSequencer::new();
        let mut raw = RawInput::default();
        raw.press(Control::Jump);

        let first = sequencer.sample(&raw);
        let second = sequencer.sample(&raw);
        raw.release(Control::Jump);
        let third = sequencer.sample(&raw);
        raw.press(Control::Jump);
        let fourth = sequencer.sample(&raw);

        assert!(first.input.has(Actions::JUMP));
        assert!(!second.input.has(Actions::JUMP));
        assert!(second.input.has(Actions::JUMP_HELD));
        assert!(third.input.is_idle());
        assert!(fourth.input.has(Actions::JUMP));
    }

    #[test]
    fn test_focus_loss_releases_held_controls() {
        let mut sequencer = InputSequencer::new();
        let mut raw = RawInput::default();
        raw.press(Control::Right);
        raw.press(Control::Fire);

        assert_eq!(sequencer.sample(&raw).input.decode_axes()[0], 1.0);

        raw.focus_lost();
        // The release event for Right never arrives; a press while
        // unfocused is ignored as well.
        raw.press(Control::Left);
        let command = sequencer.sample(&raw);
        assert!(command.input.is_idle());

        raw.focus_gained();
        assert!(sequencer.sample(&raw).input.is_idle());
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let mut raw = RawInput::default();
        raw.press(Control::Right);
        raw.press(Control::Up);

        let axes = raw.move_axes();
        assert!((axes.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_pointer_becomes_unit_aim() {
        let mut sequencer = InputSequencer::new();
        let mut raw = RawInput::default();
        raw.set_pointer(Some(Vec2::new(30.0, 40.0)));

        let aim = sequencer.sample(&raw).input.decode_aim();
        assert!((aim[0] - 0.6).abs() < 0.01);
        assert!((aim[1] - 0.8).abs() < 0.01);
    }
}

use std::cell::Cell;
use std::rc::Rc;

use gtk::prelude::*;
use relm4::prelude::*;

use crate::config;

pub struct Composer {
    buffer: gtk::TextBuffer,
    sending: bool,
    char_count: i32,
    typing_active: bool,
    quiet_timer: Option<glib::SourceId>,
    // Shared with the key controller, which must decide propagation
    // synchronously
    send_with_enter: Rc<Cell<bool>>,
}

#[derive(Debug)]
pub enum ComposerMsg {
    SendClicked,
    SetSending(bool),
    SetText(String),
    SetSendWithEnter(bool),
    // Internal
    TextChanged,
    QuietElapsed,
}

#[derive(Debug)]
pub enum ComposerOutput {
    Send(String),
    /// Raised on the first keystroke, lowered after a quiet second or a send.
    Typing(bool),
}

#[relm4::component(pub)]
impl Component for Composer {
    type Init = ();
    type Input = ComposerMsg;
    type Output = ComposerOutput;
    type CommandOutput = ();

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_spacing: 0,

            // Input card
            gtk::Box {
                set_orientation: gtk::Orientation::Vertical,
                set_margin_top: 8,
                set_margin_bottom: 8,
                set_margin_start: 12,
                set_margin_end: 12,
                add_css_class: "input-card",

                gtk::Overlay {
                    set_hexpand: true,

                    #[name = "input_scroll"]
                    gtk::ScrolledWindow {
                        set_hexpand: true,
                        set_max_content_height: 150,
                        set_propagate_natural_height: true,
                        set_min_content_height: 40,

                        #[name = "text_view"]
                        gtk::TextView {
                            set_wrap_mode: gtk::WrapMode::WordChar,
                            set_accepts_tab: false,
                            set_top_margin: 8,
                            set_bottom_margin: 8,
                            set_left_margin: 8,
                            set_right_margin: 8,
                            add_css_class: "input-text-view",

                            set_buffer: Some(&model.buffer),
                        },
                    },

                    add_overlay = &gtk::Label {
                        set_label: "Type a message — Shift+Enter for new line",
                        set_halign: gtk::Align::Start,
                        set_valign: gtk::Align::Start,
                        set_margin_start: 12,
                        set_margin_top: 8,
                        add_css_class: "input-placeholder",
                        #[watch]
                        set_visible: model.char_count == 0 && !model.sending,
                    },
                },

                // Bottom toolbar
                gtk::Box {
                    set_orientation: gtk::Orientation::Horizontal,
                    set_spacing: 4,
                    set_margin_start: 4,
                    set_margin_end: 4,
                    set_margin_bottom: 4,
                    add_css_class: "input-toolbar",

                    gtk::Box {
                        set_hexpand: true,
                    },

                    #[name = "send_button"]
                    gtk::Button {
                        set_icon_name: "go-up-symbolic",
                        set_tooltip_text: Some("Send message (Enter)"),
                        set_halign: gtk::Align::End,
                        add_css_class: "suggested-action",
                        add_css_class: "circular",
                        #[watch]
                        set_sensitive: !model.sending && model.char_count > 0,
                        connect_clicked => ComposerMsg::SendClicked,
                    },
                },
            },

            // Character count against the cap
            gtk::Label {
                set_halign: gtk::Align::End,
                set_margin_end: 24,
                set_margin_bottom: 2,
                add_css_class: "dim-label",
                add_css_class: "caption",
                #[watch]
                set_visible: model.char_count > 0,
                #[watch]
                set_label: &format!("{}/{}", model.char_count, config::MAX_MESSAGE_CHARS),
            },
        }
    }

    fn init(
        _init: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let buffer = gtk::TextBuffer::new(None::<&gtk::TextTagTable>);

        let send_with_enter = Rc::new(Cell::new(true));

        let model = Self {
            buffer: buffer.clone(),
            sending: false,
            char_count: 0,
            typing_active: false,
            quiet_timer: None,
            send_with_enter: send_with_enter.clone(),
        };

        let widgets = view_output!();

        // Enter sends, Shift+Enter inserts a newline
        let sender_key = sender.clone();
        let key_controller = gtk::EventControllerKey::new();
        key_controller.connect_key_pressed(move |_, key, _code, modifier| {
            if send_with_enter.get()
                && key == gtk::gdk::Key::Return
                && !modifier.contains(gtk::gdk::ModifierType::SHIFT_MASK)
            {
                sender_key.input(ComposerMsg::SendClicked);
                gtk::glib::Propagation::Stop
            } else {
                gtk::glib::Propagation::Proceed
            }
        });
        widgets.text_view.add_controller(key_controller);

        let sender_buf = sender.clone();
        buffer.connect_changed(move |_| {
            sender_buf.input(ComposerMsg::TextChanged);
        });

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, _root: &Self::Root) {
        match msg {
            ComposerMsg::SendClicked => {
                let trimmed = self.get_text().trim().to_string();
                if trimmed.is_empty() || self.sending {
                    return;
                }
                // Sending lowers typing straight away
                self.lower_typing(&sender);
                let _ = sender.output(ComposerOutput::Send(trimmed));
                self.buffer.set_text("");
            }
            ComposerMsg::SetSending(sending) => {
                self.sending = sending;
            }
            ComposerMsg::SetText(text) => {
                self.buffer.set_text(&text);
            }
            ComposerMsg::SetSendWithEnter(enabled) => {
                self.send_with_enter.set(enabled);
            }
            ComposerMsg::TextChanged => {
                // Hard cap, enforced at the buffer
                if self.buffer.char_count() > config::MAX_MESSAGE_CHARS {
                    let mut end = self.buffer.end_iter();
                    let mut cut = self.buffer.start_iter();
                    cut.set_offset(config::MAX_MESSAGE_CHARS);
                    self.buffer.delete(&mut cut, &mut end);
                }
                self.char_count = self.buffer.char_count();

                if self.char_count > 0 {
                    if !self.typing_active {
                        self.typing_active = true;
                        let _ = sender.output(ComposerOutput::Typing(true));
                    }
                    self.reset_quiet_timer(&sender);
                } else {
                    self.lower_typing(&sender);
                }
            }
            ComposerMsg::QuietElapsed => {
                self.quiet_timer = None;
                if self.typing_active {
                    self.typing_active = false;
                    let _ = sender.output(ComposerOutput::Typing(false));
                }
            }
        }
    }
}

impl Composer {
    fn get_text(&self) -> String {
        let start = self.buffer.start_iter();
        let end = self.buffer.end_iter();
        self.buffer.text(&start, &end, false).to_string()
    }

    /// Restarts the one-second quiet window. Each keystroke lands here, so
    /// typing only lowers once the user actually pauses.
    fn reset_quiet_timer(&mut self, sender: &ComponentSender<Self>) {
        if let Some(timer) = self.quiet_timer.take() {
            timer.remove();
        }
        let sender_quiet = sender.input_sender().clone();
        self.quiet_timer = Some(glib::timeout_add_local_once(
            config::TYPING_QUIET_WINDOW,
            move || {
                sender_quiet.send(ComposerMsg::QuietElapsed).unwrap();
            },
        ));
    }

    fn lower_typing(&mut self, sender: &ComponentSender<Self>) {
        if let Some(timer) = self.quiet_timer.take() {
            timer.remove();
        }
        if self.typing_active {
            self.typing_active = false;
            let _ = sender.output(ComposerOutput::Typing(false));
        }
    }
}

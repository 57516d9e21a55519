use std::cell::RefCell;
use std::rc::Rc;

use gtk::prelude::*;
use relm4::factory::FactoryVecDeque;
use relm4::prelude::*;

use crate::models::{Message, Sender};
use crate::services::settings::AppSettings;
use crate::ui::composer::{Composer, ComposerMsg, ComposerOutput};
use crate::ui::message_widget::{MessageWidget, MessageWidgetInit, MessageWidgetMsg, MessageWidgetOutput};

pub struct ChatView {
    messages: FactoryVecDeque<MessageWidget>,
    composer: Controller<Composer>,
    loading: bool,
    bot_typing: bool,
    scrolled_window: gtk::ScrolledWindow,
    // Auto-scroll
    user_scrolled_up: bool,
    auto_scroll: bool,
    show_timestamps: bool,
    // Date separator bookkeeping
    last_message_date: Option<String>,
    // Responsive bubble sizing
    container_width: i32,
}

#[derive(Debug)]
pub enum ChatViewMsg {
    AddMessage(Message),
    LoadMessages(Vec<Message>),
    Clear,
    SetLoading(bool),
    SetBotTyping(bool),
    ApplySettings(AppSettings),
    ScrollToBottom,
    // Internal
    ScrollPositionChanged,
    ContainerWidthChanged(i32),
    UserSend(String),
    ComposerTyping(bool),
    // Forwarded from MessageWidget
    QuickReply(String),
    CopyToClipboard(String),
}

#[derive(Debug)]
pub enum ChatViewOutput {
    SendMessage(String),
    Typing(bool),
}

#[relm4::component(pub)]
impl Component for ChatView {
    type Init = ();
    type Input = ChatViewMsg;
    type Output = ChatViewOutput;
    type CommandOutput = ();

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_vexpand: true,

            // Overlay: scrolled area + scroll-to-bottom button
            gtk::Overlay {
                set_vexpand: true,

                #[local_ref]
                scrolled_window -> gtk::ScrolledWindow {
                    set_vexpand: true,
                    set_hscrollbar_policy: gtk::PolicyType::Never,

                    #[local_ref]
                    message_list -> gtk::Box {
                        set_orientation: gtk::Orientation::Vertical,
                        set_spacing: 0,
                        set_margin_top: 8,
                        set_margin_bottom: 8,
                        set_margin_start: 16,
                        set_margin_end: 16,
                    },
                },

                add_overlay = &gtk::Button {
                    set_icon_name: "go-down-symbolic",
                    set_tooltip_text: Some("Scroll to bottom"),
                    set_halign: gtk::Align::Center,
                    set_valign: gtk::Align::End,
                    add_css_class: "circular",
                    add_css_class: "osd",
                    add_css_class: "scroll-to-bottom",
                    #[watch]
                    set_visible: model.user_scrolled_up,
                    connect_clicked => ChatViewMsg::ScrollToBottom,
                },
            },

            // Typing indicator row
            gtk::Box {
                set_orientation: gtk::Orientation::Horizontal,
                set_halign: gtk::Align::Start,
                set_margin_start: 20,
                set_margin_bottom: 8,
                set_spacing: 8,
                #[watch]
                set_visible: model.bot_typing || model.loading,

                gtk::Spinner {
                    set_spinning: true,
                },

                gtk::Label {
                    set_label: "Assistant is typing...",
                    add_css_class: "dim-label",
                    add_css_class: "caption",
                },
            },

            gtk::Separator {
                set_orientation: gtk::Orientation::Horizontal,
            },

            model.composer.widget().clone(),
        }
    }

    fn init(
        _init: Self::Init,
        _root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let messages = FactoryVecDeque::builder()
            .launch(gtk::Box::default())
            .forward(sender.input_sender(), |output| match output {
                MessageWidgetOutput::QuickReply(text) => ChatViewMsg::QuickReply(text),
                MessageWidgetOutput::CopyFullContent(content) => {
                    ChatViewMsg::CopyToClipboard(content)
                }
            });

        let composer = Composer::builder()
            .launch(())
            .forward(sender.input_sender(), |output| match output {
                ComposerOutput::Send(text) => ChatViewMsg::UserSend(text),
                ComposerOutput::Typing(active) => ChatViewMsg::ComposerTyping(active),
            });

        let scrolled_window = gtk::ScrolledWindow::new();

        let model = Self {
            messages,
            composer,
            loading: false,
            bot_typing: false,
            scrolled_window: scrolled_window.clone(),
            user_scrolled_up: false,
            auto_scroll: true,
            show_timestamps: true,
            last_message_date: None,
            container_width: 0,
        };

        let message_list = model.messages.widget();
        let widgets = view_output!();

        // Track scroll position for the jump-to-bottom button
        let sender_scroll = sender.input_sender().clone();
        scrolled_window
            .vadjustment()
            .connect_value_changed(move |_| {
                sender_scroll
                    .send(ChatViewMsg::ScrollPositionChanged)
                    .unwrap();
            });

        // Track container width for responsive bubble sizing
        let sender_resize = sender.input_sender().clone();
        let last_width: Rc<RefCell<i32>> = Rc::new(RefCell::new(0));
        let last_width_clone = last_width.clone();
        scrolled_window.add_tick_callback(move |widget, _| {
            let w = widget.width();
            if w > 0 && w != *last_width_clone.borrow() {
                *last_width_clone.borrow_mut() = w;
                let _ = sender_resize.send(ChatViewMsg::ContainerWidthChanged(w));
            }
            glib::ControlFlow::Continue
        });

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, _root: &Self::Root) {
        match msg {
            ChatViewMsg::AddMessage(message) => {
                let date_sep = self.compute_date_separator(&message);
                let show_quick_replies =
                    message.sender == Sender::Bot && !message.quick_replies.is_empty();

                let mut guard = self.messages.guard();
                // Older quick replies go stale once a new message lands
                for i in 0..guard.len() {
                    guard.send(i, MessageWidgetMsg::HideQuickReplies);
                }
                guard.push_back(MessageWidgetInit {
                    message,
                    show_date_separator: date_sep,
                    show_quick_replies,
                    show_timestamp: self.show_timestamps,
                });
                let last_idx = guard.len() - 1;
                if self.container_width > 0 {
                    guard.send(last_idx, MessageWidgetMsg::SetMaxWidth(self.container_width));
                }
                drop(guard);
                self.auto_scroll_to_bottom(&sender);
            }
            ChatViewMsg::LoadMessages(messages) => {
                let mut guard = self.messages.guard();
                guard.clear();
                self.last_message_date = None;

                for (i, msg) in messages.iter().enumerate() {
                    let date_sep = if i == 0
                        || msg.created_at.date_naive() != messages[i - 1].created_at.date_naive()
                    {
                        Some(msg.created_at.format("%B %e, %Y").to_string())
                    } else {
                        None
                    };
                    self.last_message_date = Some(msg.created_at.date_naive().to_string());
                    guard.push_back(MessageWidgetInit {
                        message: msg.clone(),
                        show_date_separator: date_sep,
                        // Quick replies only stay live on the newest message
                        show_quick_replies: i + 1 == messages.len()
                            && msg.sender == Sender::Bot
                            && !msg.quick_replies.is_empty(),
                        show_timestamp: self.show_timestamps,
                    });
                }
                if self.container_width > 0 {
                    for i in 0..guard.len() {
                        guard.send(i, MessageWidgetMsg::SetMaxWidth(self.container_width));
                    }
                }
                drop(guard);
                sender.input(ChatViewMsg::ScrollToBottom);
            }
            ChatViewMsg::Clear => {
                let mut guard = self.messages.guard();
                guard.clear();
                self.last_message_date = None;
            }
            ChatViewMsg::SetLoading(loading) => {
                self.loading = loading;
                self.composer.emit(ComposerMsg::SetSending(loading));
            }
            ChatViewMsg::SetBotTyping(typing) => {
                self.bot_typing = typing;
            }
            ChatViewMsg::ApplySettings(settings) => {
                self.auto_scroll = settings.auto_scroll;
                self.show_timestamps = settings.show_timestamps;
                self.composer
                    .emit(ComposerMsg::SetSendWithEnter(settings.send_with_enter));
            }
            ChatViewMsg::ScrollToBottom => {
                self.user_scrolled_up = false;
                let adj = self.scrolled_window.vadjustment();
                glib::idle_add_local_once(move || {
                    adj.set_value(adj.upper());
                });
            }
            ChatViewMsg::ScrollPositionChanged => {
                let adj = self.scrolled_window.vadjustment();
                let at_bottom = adj.value() >= adj.upper() - adj.page_size() - 50.0;
                self.user_scrolled_up = !at_bottom;
            }
            ChatViewMsg::ContainerWidthChanged(width) => {
                if self.container_width != width {
                    self.container_width = width;
                    let guard = self.messages.guard();
                    for i in 0..guard.len() {
                        guard.send(i, MessageWidgetMsg::SetMaxWidth(width));
                    }
                }
            }
            ChatViewMsg::UserSend(text) | ChatViewMsg::QuickReply(text) => {
                let _ = sender.output(ChatViewOutput::SendMessage(text));
            }
            ChatViewMsg::ComposerTyping(active) => {
                let _ = sender.output(ChatViewOutput::Typing(active));
            }
            ChatViewMsg::CopyToClipboard(content) => {
                if let Some(display) = gtk::gdk::Display::default() {
                    display.clipboard().set_text(&content);
                }
            }
        }
    }
}

impl ChatView {
    fn auto_scroll_to_bottom(&mut self, sender: &ComponentSender<Self>) {
        let adj = self.scrolled_window.vadjustment();
        let at_bottom = adj.value() >= adj.upper() - adj.page_size() - 50.0;
        self.user_scrolled_up = !at_bottom;

        if self.auto_scroll && !self.user_scrolled_up {
            sender.input(ChatViewMsg::ScrollToBottom);
        }
    }

    fn compute_date_separator(&mut self, message: &Message) -> Option<String> {
        let msg_date = message.created_at.date_naive().to_string();
        let needs_sep = self.last_message_date.as_deref() != Some(&msg_date);
        self.last_message_date = Some(msg_date);
        if needs_sep {
            Some(message.created_at.format("%B %e, %Y").to_string())
        } else {
            None
        }
    }
}

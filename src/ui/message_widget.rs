use gtk::prelude::*;
use relm4::prelude::*;

use crate::models::{Message, Sender};
use crate::services::markdown::{parse_reply, spans_to_pango, ReplyBlock};

/// Wrapper struct for MessageWidget initialization.
pub struct MessageWidgetInit {
    pub message: Message,
    pub show_date_separator: Option<String>, // e.g. "January 15, 2025"
    pub show_quick_replies: bool,
    pub show_timestamp: bool,
}

pub struct MessageWidget {
    pub message: Message,
    show_date_separator: Option<String>,
    show_quick_replies: bool,
    show_timestamp: bool,
    bubble: gtk::Box,
    content_box: gtk::Box,
    action_bar: gtk::Box,
    outer_box: gtk::Box,
    quick_reply_box: Option<gtk::Box>,
    message_row: Option<gtk::Box>,
}

#[derive(Debug)]
pub enum MessageWidgetMsg {
    RequestCopy,
    QuickReplyClicked(String),
    /// Quick replies only stay live under the newest bot message.
    HideQuickReplies,
    SetMaxWidth(i32),
}

#[derive(Debug)]
pub enum MessageWidgetOutput {
    CopyFullContent(String),
    QuickReply(String),
}

#[relm4::factory(pub)]
impl FactoryComponent for MessageWidget {
    type Init = MessageWidgetInit;
    type Input = MessageWidgetMsg;
    type Output = MessageWidgetOutput;
    type CommandOutput = ();
    type ParentWidget = gtk::Box;

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_spacing: 0,
        }
    }

    fn init_model(init: Self::Init, _index: &DynamicIndex, _sender: FactorySender<Self>) -> Self {
        let content_box = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .spacing(4)
            .margin_start(8)
            .margin_end(8)
            .margin_top(8)
            .margin_bottom(8)
            .build();

        let bubble = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .spacing(4)
            .hexpand(true)
            .build();

        let action_bar = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .spacing(4)
            .halign(gtk::Align::End)
            .valign(gtk::Align::Start)
            .margin_top(2)
            .margin_end(4)
            .visible(false)
            .build();
        action_bar.add_css_class("message-actions");

        let outer_box = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .spacing(0)
            .build();

        Self {
            message: init.message,
            show_date_separator: init.show_date_separator,
            show_quick_replies: init.show_quick_replies,
            show_timestamp: init.show_timestamp,
            bubble,
            content_box,
            action_bar,
            outer_box,
            quick_reply_box: None,
            message_row: None,
        }
    }

    fn init_widgets(
        &mut self,
        _index: &DynamicIndex,
        root: Self::Root,
        _returned_widget: &<Self::ParentWidget as relm4::factory::FactoryView>::ReturnedWidget,
        sender: FactorySender<Self>,
    ) -> Self::Widgets {
        let widgets = view_output!();

        let sender_kind = self.message.sender;

        if let Some(date_text) = &self.show_date_separator {
            let sep_label = gtk::Label::builder()
                .label(date_text)
                .halign(gtk::Align::Center)
                .margin_top(12)
                .margin_bottom(8)
                .build();
            sep_label.add_css_class("dim-label");
            sep_label.add_css_class("caption");
            sep_label.add_css_class("date-separator");
            self.outer_box.append(&sep_label);
        }

        // System messages are inline notices, not bubbles
        if sender_kind == Sender::System {
            let notice = gtk::Label::builder()
                .label(&self.message.content)
                .halign(gtk::Align::Center)
                .wrap(true)
                .wrap_mode(gtk::pango::WrapMode::WordChar)
                .margin_top(4)
                .margin_bottom(4)
                .build();
            notice.add_css_class("dim-label");
            notice.add_css_class("caption");
            notice.add_css_class("system-notice");
            self.outer_box.append(&notice);
            root.append(&self.outer_box);
            return widgets;
        }

        let is_user = sender_kind == Sender::User;

        if is_user {
            self.bubble.add_css_class("message-bubble-user");
        } else {
            self.bubble.add_css_class("message-bubble-bot");
        }
        self.bubble.add_css_class("card");

        // Role label + timestamp in a horizontal box
        let role_time_box = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .spacing(8)
            .margin_start(8)
            .margin_end(8)
            .margin_top(4)
            .build();

        let role_label = gtk::Label::builder()
            .label(if is_user { "You" } else { "Assistant" })
            .halign(gtk::Align::Start)
            .hexpand(true)
            .build();
        role_label.add_css_class("caption");
        role_label.add_css_class("dim-label");
        role_time_box.append(&role_label);

        let time_label = gtk::Label::builder()
            .label(self.message.created_at.format("%H:%M").to_string())
            .halign(gtk::Align::End)
            .visible(self.show_timestamp)
            .build();
        time_label.add_css_class("caption");
        time_label.add_css_class("dim-label");
        time_label.add_css_class("message-timestamp");
        role_time_box.append(&time_label);

        self.bubble.append(&role_time_box);

        if is_user {
            let label = gtk::Label::builder()
                .label(&self.message.content)
                .halign(gtk::Align::Start)
                .wrap(true)
                .wrap_mode(gtk::pango::WrapMode::WordChar)
                .selectable(true)
                .build();
            self.content_box.append(&label);
        } else {
            render_reply_blocks(&self.content_box, &self.message.content);
        }

        self.bubble.append(&self.content_box);

        // Intent / confidence / source caption under bot bubbles
        if !is_user {
            if let Some(meta) = self.message.meta_label() {
                let meta_widget = gtk::Label::builder()
                    .label(&meta)
                    .halign(gtk::Align::End)
                    .margin_end(8)
                    .margin_bottom(2)
                    .build();
                meta_widget.add_css_class("reply-meta");
                meta_widget.add_css_class("dim-label");
                meta_widget.add_css_class("caption");
                self.bubble.append(&meta_widget);
            }
        }

        // Wrap bubble in overlay for the copy button
        let overlay = gtk::Overlay::new();
        overlay.set_child(Some(&self.bubble));

        let copy_btn = gtk::Button::builder()
            .icon_name("edit-copy-symbolic")
            .tooltip_text("Copy message")
            .build();
        copy_btn.add_css_class("flat");
        copy_btn.add_css_class("circular");
        let sender_copy = sender.input_sender().clone();
        copy_btn.connect_clicked(move |_| {
            sender_copy.send(MessageWidgetMsg::RequestCopy).unwrap();
        });
        self.action_bar.append(&copy_btn);

        overlay.add_overlay(&self.action_bar);

        // Show/hide the action bar on hover
        let action_bar_ref = self.action_bar.clone();
        let motion = gtk::EventControllerMotion::new();
        let action_bar_enter = action_bar_ref.clone();
        motion.connect_enter(move |_, _, _| {
            action_bar_enter.set_visible(true);
        });
        let action_bar_leave = action_bar_ref;
        motion.connect_leave(move |_| {
            action_bar_leave.set_visible(false);
        });
        overlay.add_controller(motion);

        // User bubbles right, bot bubbles left
        let message_row = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .spacing(8)
            .margin_top(4)
            .margin_bottom(4)
            .margin_start(12)
            .margin_end(12)
            .halign(if is_user {
                gtk::Align::End
            } else {
                gtk::Align::Start
            })
            .build();
        message_row.append(&overlay);
        self.message_row = Some(message_row.clone());
        self.outer_box.append(&message_row);

        // Quick reply pills under the newest bot message
        if !is_user && self.show_quick_replies && !self.message.quick_replies.is_empty() {
            let pills = gtk::Box::builder()
                .orientation(gtk::Orientation::Horizontal)
                .spacing(6)
                .margin_start(12)
                .margin_bottom(4)
                .halign(gtk::Align::Start)
                .build();
            for reply in &self.message.quick_replies {
                let pill = gtk::Button::builder().label(reply).build();
                pill.add_css_class("pill");
                pill.add_css_class("quick-reply");
                let text = reply.clone();
                let sender_qr = sender.input_sender().clone();
                pill.connect_clicked(move |_| {
                    sender_qr
                        .send(MessageWidgetMsg::QuickReplyClicked(text.clone()))
                        .unwrap();
                });
                pills.append(&pill);
            }
            self.outer_box.append(&pills);
            self.quick_reply_box = Some(pills);
        }

        root.append(&self.outer_box);

        widgets
    }

    fn update(&mut self, msg: Self::Input, sender: FactorySender<Self>) {
        match msg {
            MessageWidgetMsg::RequestCopy => {
                let _ = sender.output(MessageWidgetOutput::CopyFullContent(
                    self.message.content.clone(),
                ));
            }
            MessageWidgetMsg::QuickReplyClicked(text) => {
                let _ = sender.output(MessageWidgetOutput::QuickReply(text));
            }
            MessageWidgetMsg::HideQuickReplies => {
                self.show_quick_replies = false;
                if let Some(pills) = self.quick_reply_box.take() {
                    self.outer_box.remove(&pills);
                }
            }
            MessageWidgetMsg::SetMaxWidth(width) => {
                if let Some(ref row) = self.message_row {
                    if self.message.sender == Sender::User {
                        row.set_margin_start(12_i32.max(width * 25 / 100));
                        row.set_margin_end(12);
                    } else {
                        row.set_margin_start(12);
                        row.set_margin_end(12_i32.max(width * 15 / 100));
                    }
                }
            }
        }
    }
}

fn render_reply_blocks(content_box: &gtk::Box, text: &str) {
    while let Some(child) = content_box.first_child() {
        content_box.remove(&child);
    }

    if text.is_empty() {
        return;
    }

    for block in &parse_reply(text) {
        content_box.append(&block_to_widget(block));
    }
}

fn block_to_widget(block: &ReplyBlock) -> gtk::Widget {
    match block {
        ReplyBlock::Paragraph(spans) => spans_label(spans).upcast(),
        ReplyBlock::Quote(spans) => {
            let label = spans_label(spans);
            let quote_box = gtk::Box::builder()
                .orientation(gtk::Orientation::Vertical)
                .spacing(4)
                .build();
            quote_box.add_css_class("blockquote");
            quote_box.append(&label);
            quote_box.upcast()
        }
        ReplyBlock::Bullets(items) => build_list(items, false),
        ReplyBlock::Numbered(items) => build_list(items, true),
        ReplyBlock::Code { language, code } => build_code_block(language.as_deref(), code),
    }
}

fn spans_label(spans: &[crate::services::markdown::Span]) -> gtk::Label {
    let label = gtk::Label::builder()
        .halign(gtk::Align::Start)
        .wrap(true)
        .wrap_mode(gtk::pango::WrapMode::WordChar)
        .selectable(true)
        .use_markup(true)
        .build();
    label.set_markup(&spans_to_pango(spans));
    label
}

fn build_list(items: &[Vec<crate::services::markdown::Span>], ordered: bool) -> gtk::Widget {
    let list_box = gtk::Box::builder()
        .orientation(gtk::Orientation::Vertical)
        .spacing(2)
        .margin_start(4)
        .build();

    for (i, item_spans) in items.iter().enumerate() {
        let item_row = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .spacing(4)
            .build();

        let bullet_text = if ordered {
            format!("{}.", i + 1)
        } else {
            "\u{2022}".to_string()
        };

        let bullet = gtk::Label::builder()
            .label(&bullet_text)
            .valign(gtk::Align::Start)
            .build();
        bullet.add_css_class("list-bullet");
        item_row.append(&bullet);

        item_row.append(&spans_label(item_spans));
        list_box.append(&item_row);
    }

    list_box.upcast()
}

fn build_code_block(language: Option<&str>, code: &str) -> gtk::Widget {
    let outer = gtk::Box::builder()
        .orientation(gtk::Orientation::Vertical)
        .spacing(0)
        .margin_top(4)
        .margin_bottom(4)
        .build();
    outer.add_css_class("code-block");

    let header = gtk::Box::builder()
        .orientation(gtk::Orientation::Horizontal)
        .spacing(8)
        .build();
    header.add_css_class("code-block-header");

    let lang_label = gtk::Label::builder()
        .label(language.unwrap_or(""))
        .halign(gtk::Align::Start)
        .hexpand(true)
        .build();
    lang_label.add_css_class("code-block-language");
    header.append(&lang_label);

    let copy_button = gtk::Button::builder()
        .icon_name("edit-copy-symbolic")
        .tooltip_text("Copy code")
        .build();
    copy_button.add_css_class("flat");
    copy_button.add_css_class("circular");

    let code_for_copy = code.to_string();
    copy_button.connect_clicked(move |btn| {
        if let Some(display) = gtk::gdk::Display::default() {
            display.clipboard().set_text(&code_for_copy);
            btn.set_icon_name("object-select-symbolic");
            let btn_clone = btn.clone();
            glib::timeout_add_local_once(std::time::Duration::from_millis(1500), move || {
                // Only touch the button while it is still in a live widget
                // tree; a conversation switch may have dropped it.
                if btn_clone.parent().is_some() {
                    btn_clone.set_icon_name("edit-copy-symbolic");
                }
            });
        }
    });
    header.append(&copy_button);

    outer.append(&header);

    let text_view = gtk::TextView::builder()
        .editable(false)
        .cursor_visible(false)
        .wrap_mode(gtk::WrapMode::WordChar)
        .monospace(true)
        .top_margin(8)
        .bottom_margin(8)
        .left_margin(12)
        .right_margin(12)
        .build();
    text_view.buffer().set_text(code);
    text_view.add_css_class("code-block-content");

    outer.append(&text_view);

    outer.upcast()
}

use indextree::NodeId;

/// Handle to a stylesheet in the document's sheet store. Object identity
/// follows the handle: the same key always names the same sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetKey(pub u32);

/// A stylesheet object, owned by the document's sheet store.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    pub media: Option<String>,
    rules: Vec<String>,
    pub disabled: bool,
    /// The `<style>` or `<link>` element that owns this sheet, if any.
    pub owner: Option<NodeId>,
}

impl StyleSheet {
    #[must_use]
    pub fn new(media: Option<String>, rules: Vec<String>) -> Self {
        Self {
            media,
            rules,
            disabled: false,
            owner: None,
        }
    }

    /// Rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub(crate) fn rules_mut(&mut self) -> &mut Vec<String> {
        &mut self.rules
    }

    /// Serialize the rule list to CSS text.
    #[must_use]
    pub fn css_text(&self) -> String {
        self.rules.join("\n")
    }
}

/// A node in a MIME part tree.
pub trait MessagePart: Sized {
    fn mime_type(&self) -> Option<&str>;
    fn children(&self) -> &[Self];
}

/// First part whose MIME type equals `mime_type`, in depth-first pre-order
/// (the root first, then each child subtree left to right).
pub fn find_first_part<'a, P: MessagePart>(root: &'a P, mime_type: &str) -> Option<&'a P> {
    let mut stack = vec![root];
    while let Some(part) = stack.pop() {
        if part
            .mime_type()
            .is_some_and(|m| m.eq_ignore_ascii_case(mime_type))
        {
            return Some(part);
        }
        stack.extend(part.children().iter().rev());
    }
    None
}

/// Body-bearing part to extract: the first `text/html`, otherwise the first `text/plain`.
pub fn find_body_part<P: MessagePart>(root: &P) -> Option<&P> {
    find_first_part(root, "text/html").or_else(|| find_first_part(root, "text/plain"))
}

//! Node constructors for expression trees.

use chrono::{NaiveDate, NaiveDateTime};

use crate::ast::{BinaryOp, Constant, Expr, ExprKind, HostValue, ShapeKind, TypeRef};
use crate::mapping::ModelRef;
use crate::value::{Value, ValueType};

impl Expr {
    /// A scalar literal.
    pub fn value(v: impl Into<Value>) -> Expr {
        let v = v.into();
        let ty = v.value_type().map(TypeRef::Scalar).unwrap_or(TypeRef::Unknown);
        Expr::new(ExprKind::Constant(Constant::Value(v)), ty)
    }

    /// A captured host value.
    pub fn host(value: HostValue) -> Expr {
        let ty = match &value {
            HostValue::Scalar(v) => v.value_type().map(TypeRef::Scalar).unwrap_or(TypeRef::Unknown),
            HostValue::Object { type_name, .. } => TypeRef::Host(type_name.clone()),
        };
        Expr::new(ExprKind::Constant(Constant::Host(value)), ty)
    }

    /// The root row source for `model`.
    pub fn table(model: ModelRef) -> Expr {
        let ty = TypeRef::sequence(TypeRef::Model(model.clone()));
        Expr::new(ExprKind::Constant(Constant::Table(model)), ty)
    }

    pub fn param(name: impl Into<String>, ty: TypeRef) -> Expr {
        Expr::new(ExprKind::Parameter(name.into()), ty)
    }

    /// Member access, typed from the target's type when known.
    pub fn field(self, name: impl Into<String>) -> Expr {
        let field = name.into();
        let ty = self.ty().member(&field);
        Expr::new(
            ExprKind::FieldAccess {
                target: Box::new(self),
                field,
            },
            ty,
        )
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let ty = if op.is_logical() || op.is_comparison() {
            TypeRef::Scalar(ValueType::Bool)
        } else {
            left.ty().clone()
        };
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Eq, self, rhs.into())
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ne, self, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Gt, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ge, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Or, self, rhs.into())
    }

    pub fn add(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Add, self, rhs.into())
    }

    pub fn sub(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Sub, self, rhs.into())
    }

    pub fn mul(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Mul, self, rhs.into())
    }

    pub fn div(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Div, self, rhs.into())
    }

    /// An instance method call on this node.
    pub fn method(self, name: &str, args: Vec<Expr>) -> Expr {
        let ty = match name {
            "ToString" | "ToUpper" | "ToLower" | "Trim" => TypeRef::Scalar(ValueType::Text),
            "Contains" | "StartsWith" | "EndsWith" => TypeRef::Scalar(ValueType::Bool),
            "AddDays" | "AddHours" | "AddMinutes" | "AddSeconds" | "AddMonths" | "AddYears" => {
                TypeRef::Scalar(ValueType::DateTime)
            }
            _ => TypeRef::Unknown,
        };
        Expr::new(
            ExprKind::Call {
                target: Some(Box::new(self)),
                method: name.to_string(),
                args,
            },
            ty,
        )
    }

    /// A static query-operator call; the source is `args[0]`.
    pub fn call(method: &str, args: Vec<Expr>, ty: TypeRef) -> Expr {
        Expr::new(
            ExprKind::Call {
                target: None,
                method: method.to_string(),
                args,
            },
            ty,
        )
    }

    pub fn lambda<S: AsRef<str>>(params: &[S], body: Expr) -> Expr {
        let ty = body.ty().clone();
        Expr::new(
            ExprKind::Lambda {
                params: params.iter().map(|p| p.as_ref().to_string()).collect(),
                body: Box::new(body),
            },
            ty,
        )
    }

    pub fn quote(self) -> Expr {
        let ty = self.ty().clone();
        Expr::new(ExprKind::Quote(Box::new(self)), ty)
    }

    /// Construct `model` from named member expressions.
    pub fn new_object<S: Into<String>>(
        model: ModelRef,
        shape: ShapeKind,
        members: impl IntoIterator<Item = (S, Expr)>,
    ) -> Expr {
        Expr::new(
            ExprKind::New {
                shape,
                members: members.into_iter().map(|(n, e)| (n.into(), e)).collect(),
            },
            TypeRef::Model(model),
        )
    }

    /// `COUNT(*)` over a group parameter.
    pub fn group_count(self) -> Expr {
        Expr::call("Count", vec![self], TypeRef::Scalar(ValueType::Int))
    }

    /// `Sum`, `Min`, `Max` or `Average` of `selector` over a group parameter.
    pub fn group_aggregate(self, func: &str, selector: impl FnOnce(Expr) -> Expr) -> Expr {
        let element = match self.ty() {
            TypeRef::Grouping { element, .. } => (**element).clone(),
            _ => TypeRef::Unknown,
        };
        let body = selector(Expr::param("e", element));
        let ty = match func {
            "Average" => TypeRef::Scalar(ValueType::Float),
            _ => body.ty().clone(),
        };
        let lambda = Expr::lambda(&["e"], body);
        Expr::call(func, vec![self, lambda], ty)
    }
}

macro_rules! impl_expr_literal {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::value(v)
                }
            }
        )*
    };
}

impl_expr_literal!(Value, bool, i32, i64, f64, &str, String, NaiveDateTime, NaiveDate);

impl From<HostValue> for Expr {
    fn from(v: HostValue) -> Self {
        Expr::host(v)
    }
}
